use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::{CobrancaResult, ConfigCobranca};

// Estrutura para o Clap processar os argumentos da linha de comando
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Arguments {
    /// Clear screen
    #[arg(short, long, default_value_t = false)]
    clear: bool,

    /// Arquivo de configuração do convênio (TOML).
    #[arg(long, default_value = "cobranca.toml")]
    config: PathBuf,

    /// Cadastro de boletos em CSV delimitado por ';'.
    #[arg(short, long, default_value = "boletos.csv")]
    boletos: PathBuf,

    /// Ativar modo detalhado (verbose)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    comando: Comando,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Comando {
    /// Gera os boletos das parcelas de um contrato.
    Gerar {
        #[arg(long)]
        cliente: String,
        #[arg(long)]
        contrato: String,
        /// Valor total do contrato (ex.: 1500.00)
        #[arg(long)]
        valor_total: Decimal,
        #[arg(long, default_value_t = 1)]
        parcelas: u32,
        /// Vencimento da primeira parcela (AAAA-MM-DD)
        #[arg(long)]
        vencimento: NaiveDate,
        #[arg(long)]
        pagador: String,
        /// CPF ou CNPJ do pagador
        #[arg(long)]
        documento: String,
        #[arg(long, default_value = "Parcela do contrato")]
        descricao: String,
    },
    /// Codifica o arquivo de remessa dos boletos gerados.
    Remessa {
        /// Ids dos boletos; sem ids, seleciona todos os gerados.
        #[arg(long = "id")]
        ids: Vec<String>,
        /// Número sequencial do arquivo no convênio.
        #[arg(long)]
        sequencial: u32,
        /// Diretório de saída do arquivo .rem
        #[arg(short, long, default_value = ".")]
        saida: PathBuf,
    },
    /// Confere um arquivo de remessa ou uma linha digitável/código de barras.
    Inspecionar {
        #[arg(long, conflicts_with = "codigo", required_unless_present = "codigo")]
        remessa: Option<PathBuf>,
        #[arg(long)]
        codigo: Option<String>,
    },
    /// Simula o retorno do banco para uma remessa (homologação).
    Simular {
        remessa: PathBuf,
        /// Nossos números a liquidar.
        #[arg(long = "pago")]
        pagos: Vec<String>,
        /// Nossos números a baixar.
        #[arg(long = "cancelado")]
        cancelados: Vec<String>,
        /// Data da ocorrência (AAAA-MM-DD)
        #[arg(long)]
        data: NaiveDate,
        #[arg(long, default_value_t = 1)]
        protocolo: u32,
        #[arg(short, long)]
        saida: PathBuf,
    },
    /// Decodifica arquivos de retorno sem alterar o cadastro.
    Retorno {
        #[arg(required = true)]
        arquivos: Vec<PathBuf>,
    },
    /// Processa um retorno e concilia os boletos do cadastro.
    Conciliar {
        arquivo: PathBuf,
        /// Exporta o resultado da conciliação em CSV.
        #[arg(short, long)]
        relatorio: Option<PathBuf>,
    },
}

#[derive(Debug)]
pub struct Config {
    pub clear: bool,
    pub verbose: bool,
    pub boletos: PathBuf,
    pub cobranca: ConfigCobranca,
    pub comando: Comando,
}

impl Config {
    /// Carrega a configuração do convênio indicada nos argumentos.
    pub fn from_arguments(args: Arguments) -> CobrancaResult<Self> {
        let cobranca = ConfigCobranca::carregar(&args.config)?;

        Ok(Config {
            clear: args.clear,
            verbose: args.verbose,
            boletos: args.boletos,
            cobranca,
            comando: args.comando,
        })
    }
}

pub fn get_config() -> CobrancaResult<Config> {
    Config::from_arguments(Arguments::parse())
}
