use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::{CobrancaError, CobrancaResult, StatusRetorno, apenas_digitos};

/// Configuração do convênio de cobrança e do layout dos arquivos,
/// lida de um arquivo TOML (ex.: `cobranca.toml`):
///
/// ```toml
/// [banco]
/// codigo_banco = "237"
/// nome_banco = "BRADESCO"
/// codigo_convenio = "1234567"
/// carteira = "109"
/// agencia = "0001"
/// nome_empresa = "LOTEADORA VALE VERDE"
///
/// [arquivo]
/// largura_registro = 400
/// codificacao = "ascii"
/// formato_data = "DDMMAA"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigCobranca {
    pub banco: ConfigBanco,
    #[serde(default)]
    pub arquivo: ConfigArquivo,
    #[serde(default)]
    pub ocorrencias: TabelaOcorrencias,
    #[serde(default)]
    pub identificador: PoliticaNossoNumero,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigBanco {
    /// Código de compensação do banco (3 dígitos).
    pub codigo_banco: String,
    #[serde(default)]
    pub nome_banco: String,
    /// Código do convênio / cedente (até 7 dígitos).
    pub codigo_convenio: String,
    /// Carteira de cobrança (até 3 dígitos).
    pub carteira: String,
    /// Agência do beneficiário (até 4 dígitos).
    pub agencia: String,
    #[serde(default)]
    pub nome_empresa: String,
}

impl ConfigBanco {
    /// Parâmetros do convênio: obrigatórios, numéricos e dentro da largura
    /// que ocupam no campo livre do código de barras.
    pub fn validar(&self) -> CobrancaResult<()> {
        let campos_numericos = [
            ("codigo_banco", &self.codigo_banco, 3),
            ("codigo_convenio", &self.codigo_convenio, 7),
            ("carteira", &self.carteira, 3),
            ("agencia", &self.agencia, 4),
        ];

        for (nome, valor, maximo) in campos_numericos {
            if valor.is_empty() {
                return Err(CobrancaError::InvalidConfiguration(format!(
                    "parâmetro '{nome}' ausente"
                )));
            }
            if !apenas_digitos(valor) || valor.len() > maximo {
                return Err(CobrancaError::InvalidConfiguration(format!(
                    "parâmetro '{nome}' deve ter até {maximo} dígitos: <{valor}>"
                )));
            }
        }

        if self.codigo_banco.len() != 3 {
            return Err(CobrancaError::InvalidConfiguration(format!(
                "codigo_banco deve ter 3 dígitos: <{}>",
                self.codigo_banco
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigArquivo {
    /// Largura de cada registro: 240 ou 400 posições.
    pub largura_registro: usize,
    pub codificacao: Codificacao,
    pub formato_data: FormatoData,
}

impl Default for ConfigArquivo {
    fn default() -> Self {
        Self {
            largura_registro: 400,
            codificacao: Codificacao::Ascii,
            formato_data: FormatoData::Ddmmaa,
        }
    }
}

/// Codificação dos bytes do arquivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codificacao {
    /// Linhas ASCII terminadas por CRLF.
    Ascii,
    /// Blocos de tamanho fixo, página de código 037, sem terminadores.
    Ebcdic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatoData {
    #[serde(rename = "DDMMAA")]
    Ddmmaa,
    #[serde(rename = "DDMMAAAA")]
    Ddmmaaaa,
    #[serde(rename = "AAAAMMDD")]
    Aaaammdd,
}

impl FormatoData {
    pub fn largura(self) -> usize {
        match self {
            FormatoData::Ddmmaa => 6,
            FormatoData::Ddmmaaaa | FormatoData::Aaaammdd => 8,
        }
    }

    pub fn padrao_chrono(self) -> &'static str {
        match self {
            FormatoData::Ddmmaa => "%d%m%y",
            FormatoData::Ddmmaaaa => "%d%m%Y",
            FormatoData::Aaaammdd => "%Y%m%d",
        }
    }
}

/// Códigos de ocorrência do retorno agrupados pelo status que representam.
///
/// A tabela padrão segue os códigos mais comuns da cobrança CNAB 400;
/// cada banco pode sobrescrevê-la no arquivo de configuração.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabelaOcorrencias {
    pub pago: Vec<String>,
    pub cancelado: Vec<String>,
    pub vencido: Vec<String>,
}

impl Default for TabelaOcorrencias {
    fn default() -> Self {
        let codigos = |lista: &[&str]| lista.iter().map(|c| c.to_string()).collect();
        Self {
            pago: codigos(&["06", "07", "08", "17"]),
            cancelado: codigos(&["09", "10"]),
            vencido: codigos(&["14"]),
        }
    }
}

impl TabelaOcorrencias {
    pub fn status(&self, codigo: &str) -> StatusRetorno {
        let contem = |lista: &[String]| lista.iter().any(|c| c == codigo);

        if contem(&self.pago) {
            StatusRetorno::Pago
        } else if contem(&self.cancelado) {
            StatusRetorno::Cancelado
        } else if contem(&self.vencido) {
            StatusRetorno::Vencido
        } else {
            StatusRetorno::Desconhecido(codigo.to_string())
        }
    }

    /// Primeiro código associado ao status (usado pelo simulador de retorno).
    pub fn codigo_de<'a>(&'a self, status: &'a StatusRetorno) -> Option<&'a str> {
        let lista = match status {
            StatusRetorno::Pago => &self.pago,
            StatusRetorno::Cancelado => &self.cancelado,
            StatusRetorno::Vencido => &self.vencido,
            StatusRetorno::Desconhecido(codigo) => return Some(codigo.as_str()),
        };
        lista.first().map(String::as_str)
    }
}

/// Política de alocação do nosso número.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "politica", rename_all = "lowercase")]
pub enum PoliticaNossoNumero {
    /// Sequência monotônica a partir de `proximo`.
    Sequencial { proximo: u64 },
    /// Sorteio com verificação de unicidade, limitado a `tentativas`.
    Aleatorio { tentativas: u32 },
}

impl Default for PoliticaNossoNumero {
    fn default() -> Self {
        PoliticaNossoNumero::Sequencial { proximo: 1 }
    }
}

impl ConfigCobranca {
    pub fn carregar(path: &Path) -> CobrancaResult<Self> {
        let texto = fs::read_to_string(path).map_err(|e| CobrancaError::IoReader {
            source: e,
            arquivo: path.to_path_buf(),
        })?;

        let config: ConfigCobranca = toml::from_str(&texto)?;
        config.validar()?;

        Ok(config)
    }

    /// Verifica os parâmetros obrigatórios do banco e do layout.
    pub fn validar(&self) -> CobrancaResult<()> {
        self.banco.validar()?;

        if !matches!(self.arquivo.largura_registro, 240 | 400) {
            return Err(CobrancaError::InvalidConfiguration(format!(
                "largura_registro deve ser 240 ou 400, encontrado {}",
                self.arquivo.largura_registro
            )));
        }

        match self.identificador {
            PoliticaNossoNumero::Aleatorio { tentativas: 0 } => {
                Err(CobrancaError::InvalidConfiguration(
                    "política aleatória exige ao menos 1 tentativa".into(),
                ))
            }
            PoliticaNossoNumero::Sequencial { proximo } if proximo > 99_999_999_999 => {
                Err(CobrancaError::InvalidConfiguration(format!(
                    "sequência de nosso número esgotada: {proximo}"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn config_de_teste() -> ConfigCobranca {
    ConfigCobranca {
        banco: ConfigBanco {
            codigo_banco: "237".into(),
            nome_banco: "BRADESCO".into(),
            codigo_convenio: "1234567".into(),
            carteira: "109".into(),
            agencia: "0001".into(),
            nome_empresa: "Loteadora Vale Verde".into(),
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_configuracao_toml_com_padroes() {
        let texto = r#"
            [banco]
            codigo_banco = "001"
            codigo_convenio = "7654321"
            carteira = "17"
            agencia = "1234"

            [arquivo]
            largura_registro = 240
            codificacao = "ebcdic"
            formato_data = "AAAAMMDD"

            [identificador]
            politica = "aleatorio"
            tentativas = 5
        "#;

        let config: ConfigCobranca = toml::from_str(texto).unwrap();
        config.validar().unwrap();

        assert_eq!(config.arquivo.largura_registro, 240);
        assert_eq!(config.arquivo.codificacao, Codificacao::Ebcdic);
        assert_eq!(config.arquivo.formato_data, FormatoData::Aaaammdd);
        assert_eq!(
            config.identificador,
            PoliticaNossoNumero::Aleatorio { tentativas: 5 }
        );
        assert_eq!(config.ocorrencias.status("06"), StatusRetorno::Pago);
    }

    #[test]
    fn rejeita_parametros_ausentes_ou_invalidos() {
        let mut config = config_de_teste();
        config.banco.codigo_convenio.clear();
        assert!(matches!(
            config.validar(),
            Err(CobrancaError::InvalidConfiguration(_))
        ));

        let mut config = config_de_teste();
        config.banco.agencia = "12A4".into();
        assert!(config.validar().is_err());

        let mut config = config_de_teste();
        config.arquivo.largura_registro = 300;
        assert!(config.validar().is_err());
    }

    #[test]
    fn ocorrencia_desconhecida_nao_e_descartada() {
        let tabela = TabelaOcorrencias::default();
        assert_eq!(tabela.status("09"), StatusRetorno::Cancelado);
        assert_eq!(tabela.status("14"), StatusRetorno::Vencido);
        assert_eq!(
            tabela.status("99"),
            StatusRetorno::Desconhecido("99".into())
        );
    }

    #[test]
    fn codigo_de_ocorrencia_por_status() {
        let tabela = TabelaOcorrencias::default();
        assert_eq!(tabela.codigo_de(&StatusRetorno::Pago), Some("06"));
        assert_eq!(tabela.codigo_de(&StatusRetorno::Cancelado), Some("09"));

        let desconhecido = StatusRetorno::Desconhecido("Z1".into());
        assert_eq!(tabela.codigo_de(&desconhecido), Some("Z1"));

        let vazia = TabelaOcorrencias {
            vencido: Vec::new(),
            ..TabelaOcorrencias::default()
        };
        assert_eq!(vazia.codigo_de(&StatusRetorno::Vencido), None);
    }
}
