use std::{io, path::PathBuf};
use thiserror::Error;

/// Tipo de retorno conveniente para todo o projeto
pub type CobrancaResult<T> = Result<T, CobrancaError>;

#[derive(Error, Debug)]
pub enum CobrancaError {
    #[error("Lote rejeitado: {0}")]
    Validation(String),

    #[error(
        "Registro malformado!\n\
        Linha nº: {linha}\n\
        Motivo: {motivo}"
    )]
    MalformedRecord { linha: usize, motivo: String },

    #[error("Total de controle divergente em <{campo}>: declarado {declarado}, apurado {apurado}")]
    ControlTotalMismatch {
        campo: &'static str,
        declarado: String,
        apurado: String,
    },

    #[error("Nosso número já utilizado: {nosso_numero} (tentativas: {tentativas})")]
    IdentifierCollision {
        nosso_numero: String,
        tentativas: u32,
    },

    #[error("Boleto não encontrado: nosso número {0}")]
    BoletoNotFound(String),

    #[error("Conflito de estado no boleto {nosso_numero}: {atual} -> {pretendido}")]
    StateConflict {
        nosso_numero: String,
        atual: String,
        pretendido: String,
    },

    #[error("Ocorrência já aplicada ao boleto {0}")]
    AlreadyApplied(String),

    #[error("Erro de configuração: {0}")]
    InvalidConfiguration(String),

    #[error("Erro no processamento CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Erro de I/O: {0}")]
    Io(#[from] io::Error),

    #[error(
        "Arquivo não encontrado!\n\
        Arquivo: {arquivo:?}\n\
        {source}"
    )]
    IoReader {
        #[source]
        source: io::Error,
        arquivo: PathBuf,
    },

    #[error("Erro no arquivo de configuração TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CobrancaError {
    pub fn malformado(linha: usize, motivo: impl Into<String>) -> Self {
        CobrancaError::MalformedRecord {
            linha,
            motivo: motivo.into(),
        }
    }
}
