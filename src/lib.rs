mod args;
mod boleto;
mod comandos;
mod conciliacao;
mod config;
mod digitos;
mod error;
mod identificador;
mod layout;
mod metadata;
mod regex;
mod relatorio;
mod remessa;
mod repositorio;
mod retorno;

pub use self::{
    args::*, boleto::*, comandos::*, conciliacao::*, config::*, digitos::*, error::*,
    identificador::*, layout::*, metadata::*, regex::*, relatorio::*, remessa::*, repositorio::*,
    retorno::*,
};
