use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::{
    CobrancaError, CobrancaResult, ConfigCobranca, LayoutArquivo, LayoutRegistro,
    TAMANHO_NOSSO_NUMERO, TIPO_DETALHE, TIPO_HEADER, TIPO_TRAILER, TabelaOcorrencias,
    centavos_em_valor, codificar_registros, decodificar_registros, valor_em_centavos,
};

/// Situação informada pelo banco para um título.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum StatusRetorno {
    Pago,
    Vencido,
    Cancelado,
    /// Código de ocorrência sem correspondência na tabela configurada.
    Desconhecido(String),
}

impl fmt::Display for StatusRetorno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusRetorno::Pago => f.write_str("pago"),
            StatusRetorno::Vencido => f.write_str("vencido"),
            StatusRetorno::Cancelado => f.write_str("cancelado"),
            StatusRetorno::Desconhecido(codigo) => write!(f, "desconhecido ({codigo})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistroRetorno {
    /// Linha de origem no arquivo.
    pub linha: usize,
    pub nosso_numero: String,
    pub numero_documento: String,
    pub codigo_ocorrencia: String,
    pub status: StatusRetorno,
    pub data_ocorrencia: NaiveDate,
    pub data_vencimento: Option<NaiveDate>,
    pub valor_titulo: Decimal,
    pub data_pagamento: Option<NaiveDate>,
    /// Ausente quando o banco não informa valor pago.
    pub valor_pago: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoteRetorno {
    pub protocolo: u32,
    pub codigo_banco: String,
    pub codigo_convenio: String,
    pub data_processamento: Option<NaiveDate>,
    pub registros: Vec<RegistroRetorno>,
    /// Linhas físicas do arquivo, para auditoria.
    pub total_linhas: usize,
    pub impressao_digital: String,
}

impl LoteRetorno {
    pub fn desconhecidos(&self) -> impl Iterator<Item = &RegistroRetorno> {
        self.registros
            .iter()
            .filter(|r| matches!(r.status, StatusRetorno::Desconhecido(_)))
    }
}

/// Resultado parcial: registros aproveitáveis e a lista de erros por registro.
#[derive(Debug)]
pub struct RetornoDecodificado {
    pub lote: LoteRetorno,
    pub erros: Vec<CobrancaError>,
}

impl RetornoDecodificado {
    pub fn sem_erros(&self) -> bool {
        self.erros.is_empty()
    }
}

/// Layout do retorno (banco -> empresa).
pub fn layout_retorno(config: &ConfigCobranca) -> CobrancaResult<LayoutArquivo> {
    let largura = config.arquivo.largura_registro;
    let data = config.arquivo.formato_data.largura();

    let header = LayoutRegistro::novo(largura)
        .numerico("tipo_registro", 1)
        .numerico("operacao", 1)
        .alfa("literal_operacao", 7)
        .numerico("codigo_servico", 2)
        .alfa("literal_servico", 15)
        .numerico("codigo_convenio", 20)
        .alfa("nome_empresa", 30)
        .numerico("codigo_banco", 3)
        .alfa("nome_banco", 15)
        .numerico("data_gravacao", data)
        .numerico("protocolo", 7)
        .fechar()?;

    let detalhe = LayoutRegistro::novo(largura)
        .numerico("tipo_registro", 1)
        .numerico("agencia", 4)
        .numerico("carteira", 3)
        .numerico("codigo_convenio", 7)
        .numerico("nosso_numero", TAMANHO_NOSSO_NUMERO)
        .alfa("numero_documento", 10)
        .alfa("codigo_ocorrencia", 2)
        .numerico("data_ocorrencia", data)
        .numerico("data_vencimento", data)
        .numerico("valor_titulo", 13)
        .numerico("valor_pago", 13)
        .fechar()?;

    let trailer = LayoutRegistro::novo(largura)
        .numerico("tipo_registro", 1)
        .numerico("quantidade_titulos", 8)
        .numerico("valor_total_pago", 15)
        .fechar()?;

    Ok(LayoutArquivo {
        header,
        detalhe,
        trailer,
    })
}

struct CabecalhoRetorno {
    protocolo: u32,
    codigo_banco: String,
    codigo_convenio: String,
    data_processamento: Option<NaiveDate>,
}

fn ler_cabecalho(
    layout: &LayoutRegistro,
    linha: &str,
    config: &ConfigCobranca,
) -> CobrancaResult<CabecalhoRetorno> {
    if !linha.starts_with(TIPO_HEADER) {
        return Err(CobrancaError::Validation(
            "arquivo não inicia com header de retorno".into(),
        ));
    }

    let registro = layout.ler(linha, 1)?;

    if registro.digitos("operacao")? != "2" || registro.texto("literal_operacao")? != "RETORNO" {
        return Err(CobrancaError::Validation(
            "header não identifica um arquivo de retorno".into(),
        ));
    }

    let codigo_banco = registro.digitos("codigo_banco")?.to_string();
    if codigo_banco != config.banco.codigo_banco {
        return Err(CobrancaError::Validation(format!(
            "retorno do banco {codigo_banco}, esperado {}",
            config.banco.codigo_banco
        )));
    }

    let codigo_convenio = registro
        .digitos("codigo_convenio")?
        .trim_start_matches('0')
        .to_string();
    if codigo_convenio != config.banco.codigo_convenio.trim_start_matches('0') {
        return Err(CobrancaError::Validation(format!(
            "retorno do convênio {codigo_convenio}, esperado {}",
            config.banco.codigo_convenio
        )));
    }

    Ok(CabecalhoRetorno {
        protocolo: registro.numero("protocolo")? as u32,
        codigo_banco,
        codigo_convenio,
        data_processamento: registro.data("data_gravacao", config.arquivo.formato_data)?,
    })
}

fn ler_detalhe(
    layout: &LayoutRegistro,
    linha: &str,
    numero: usize,
    config: &ConfigCobranca,
    tabela: &TabelaOcorrencias,
) -> CobrancaResult<RegistroRetorno> {
    let formato = config.arquivo.formato_data;
    let registro = layout.ler(linha, numero)?;

    let codigo_ocorrencia = registro.texto("codigo_ocorrencia")?.to_string();
    if codigo_ocorrencia.is_empty() {
        return Err(CobrancaError::malformado(numero, "código de ocorrência em branco"));
    }

    let status = tabela.status(&codigo_ocorrencia);
    let data_ocorrencia = registro
        .data("data_ocorrencia", formato)?
        .ok_or_else(|| CobrancaError::malformado(numero, "data de ocorrência não informada"))?;

    let valor_pago = match registro.numero("valor_pago")? {
        0 => None,
        centavos => Some(centavos_em_valor(centavos)),
    };

    let (data_pagamento, valor_pago) = match status {
        StatusRetorno::Pago => (Some(data_ocorrencia), valor_pago),
        _ => (None, None),
    };

    Ok(RegistroRetorno {
        linha: numero,
        nosso_numero: registro.digitos("nosso_numero")?.to_string(),
        numero_documento: registro.texto("numero_documento")?.to_string(),
        codigo_ocorrencia,
        status,
        data_ocorrencia,
        data_vencimento: registro.data("data_vencimento", formato)?,
        valor_titulo: centavos_em_valor(registro.numero("valor_titulo")?),
        data_pagamento,
        valor_pago,
    })
}

/// Decodifica um arquivo de retorno.
///
/// Problemas de estrutura do arquivo (vazio, sem header de retorno, banco ou
/// convênio divergentes) rejeitam a chamada. Problemas de registro individual
/// são acumulados em `erros` e a leitura prossegue com as demais linhas.
pub fn decodificar_retorno(
    conteudo: &[u8],
    config: &ConfigCobranca,
) -> CobrancaResult<RetornoDecodificado> {
    if conteudo.is_empty() {
        return Err(CobrancaError::Validation("arquivo de retorno vazio".into()));
    }

    let layout = layout_retorno(config)?;
    let tabela = &config.ocorrencias;
    let linhas = decodificar_registros(
        conteudo,
        config.arquivo.codificacao,
        config.arquivo.largura_registro,
    );

    let (_, primeira) = linhas
        .first()
        .ok_or_else(|| CobrancaError::Validation("arquivo de retorno vazio".into()))?;

    let cabecalho = match primeira {
        Ok(texto) => ler_cabecalho(&layout.header, texto, config)?,
        Err(e) => return Err(CobrancaError::malformado(1, e.to_string())),
    };

    let mut registros = Vec::new();
    let mut erros = Vec::new();
    let mut linhas_de_detalhe = 0u64;
    let mut soma_pago: u64 = 0;
    let mut trailer: Option<(u64, u64)> = None;

    for (numero, texto) in linhas.iter().skip(1) {
        let numero = *numero;

        let texto = match texto {
            Ok(texto) => texto,
            Err(e) => {
                warn!("retorno: linha {numero} ilegível: {e}");
                erros.push(CobrancaError::malformado(numero, e.to_string()));
                continue;
            }
        };

        if trailer.is_some() {
            erros.push(CobrancaError::malformado(numero, "registro após o trailer"));
            continue;
        }

        match texto.chars().next() {
            Some(TIPO_DETALHE) => {
                linhas_de_detalhe += 1;

                match ler_detalhe(&layout.detalhe, texto, numero, config, tabela) {
                    Ok(registro) => {
                        if let Some(pago) = registro.valor_pago {
                            // valor lido de 13 dígitos sempre converte de volta
                            soma_pago += valor_em_centavos(pago).unwrap_or_default();
                        }
                        debug!(
                            "retorno: linha {numero} nosso número {} -> {}",
                            registro.nosso_numero, registro.status
                        );
                        registros.push(registro);
                    }
                    Err(e) => {
                        warn!("retorno: {e}");
                        erros.push(e);
                    }
                }
            }
            Some(TIPO_TRAILER) => match layout.trailer.ler(texto, numero).and_then(|r| {
                Ok((r.numero("quantidade_titulos")?, r.numero("valor_total_pago")?))
            }) {
                Ok(totais) => trailer = Some(totais),
                Err(e) => {
                    // Trailer ilegível: os totais não podem ser conferidos.
                    erros.push(e);
                    trailer = Some((linhas_de_detalhe, soma_pago));
                }
            },
            Some(TIPO_HEADER) => {
                erros.push(CobrancaError::malformado(numero, "header repetido"));
            }
            tipo => {
                erros.push(CobrancaError::malformado(
                    numero,
                    format!("tipo de registro desconhecido: {tipo:?}"),
                ));
            }
        }
    }

    match trailer {
        Some((quantidade, valor)) => {
            if quantidade != linhas_de_detalhe {
                erros.push(CobrancaError::ControlTotalMismatch {
                    campo: "quantidade_titulos",
                    declarado: quantidade.to_string(),
                    apurado: linhas_de_detalhe.to_string(),
                });
            }
            if valor != soma_pago {
                erros.push(CobrancaError::ControlTotalMismatch {
                    campo: "valor_total_pago",
                    declarado: centavos_em_valor(valor).to_string(),
                    apurado: centavos_em_valor(soma_pago).to_string(),
                });
            }
        }
        None => erros.push(CobrancaError::malformado(linhas.len(), "trailer ausente")),
    }

    let lote = LoteRetorno {
        protocolo: cabecalho.protocolo,
        codigo_banco: cabecalho.codigo_banco,
        codigo_convenio: cabecalho.codigo_convenio,
        data_processamento: cabecalho.data_processamento,
        registros,
        total_linhas: linhas.len(),
        impressao_digital: blake3::hash(conteudo).to_hex().to_string(),
    };

    info!(
        "retorno {} decodificado: {} registros, {} erros",
        lote.protocolo,
        lote.registros.len(),
        erros.len()
    );

    Ok(RetornoDecodificado { lote, erros })
}

/// Decodifica arquivos de retorno independentes em paralelo, preservando a ordem.
pub fn decodificar_lotes(
    arquivos: &[Vec<u8>],
    config: &ConfigCobranca,
) -> Vec<CobrancaResult<RetornoDecodificado>> {
    arquivos
        .par_iter()
        .map(|conteudo| decodificar_retorno(conteudo, config))
        .collect()
}

/// Ocorrência a ser escrita pelo simulador de retorno.
#[derive(Debug, Clone)]
pub struct OcorrenciaSimulada {
    pub nosso_numero: String,
    pub numero_documento: String,
    pub status: StatusRetorno,
    pub data_ocorrencia: NaiveDate,
    pub data_vencimento: Option<NaiveDate>,
    pub valor_titulo: Decimal,
    pub valor_pago: Option<Decimal>,
}

/// Escreve um arquivo de retorno como o banco o faria.
///
/// Útil para homologação e testes: o arquivo produzido é aceito por
/// [`decodificar_retorno`] com a mesma configuração.
pub fn codificar_retorno(
    ocorrencias: &[OcorrenciaSimulada],
    protocolo: u32,
    data_processamento: NaiveDate,
    config: &ConfigCobranca,
) -> CobrancaResult<Vec<u8>> {
    let layout = layout_retorno(config)?;
    let banco = &config.banco;
    let formato = config.arquivo.formato_data;

    let mut registros = Vec::with_capacity(ocorrencias.len() + 2);

    let mut header = layout.header.registro();
    header
        .preencher("tipo_registro", "0")?
        .preencher("operacao", "2")?
        .preencher("literal_operacao", "RETORNO")?
        .preencher("codigo_servico", "01")?
        .preencher("literal_servico", "COBRANCA")?
        .preencher("codigo_convenio", &banco.codigo_convenio)?
        .preencher("nome_empresa", &banco.nome_empresa)?
        .preencher("codigo_banco", &banco.codigo_banco)?
        .preencher("nome_banco", &banco.nome_banco)?
        .data("data_gravacao", data_processamento, formato)?
        .numero("protocolo", u64::from(protocolo))?;
    registros.push(header.finalizar(1)?);

    let mut soma_pago = 0;

    for ocorrencia in ocorrencias {
        let codigo = config
            .ocorrencias
            .codigo_de(&ocorrencia.status)
            .ok_or_else(|| {
                CobrancaError::InvalidConfiguration(format!(
                    "nenhum código de ocorrência configurado para {}",
                    ocorrencia.status
                ))
            })?;

        let pago = ocorrencia.valor_pago.map(valor_em_centavos).transpose()?.unwrap_or(0);
        soma_pago += pago;

        let mut detalhe = layout.detalhe.registro();
        detalhe
            .preencher("tipo_registro", "1")?
            .preencher("agencia", &banco.agencia)?
            .preencher("carteira", &banco.carteira)?
            .preencher("codigo_convenio", &banco.codigo_convenio)?
            .preencher("nosso_numero", &ocorrencia.nosso_numero)?
            .preencher("numero_documento", &ocorrencia.numero_documento)?
            .preencher("codigo_ocorrencia", codigo)?
            .data("data_ocorrencia", ocorrencia.data_ocorrencia, formato)?
            .numero("valor_titulo", valor_em_centavos(ocorrencia.valor_titulo)?)?
            .numero("valor_pago", pago)?;
        if let Some(vencimento) = ocorrencia.data_vencimento {
            detalhe.data("data_vencimento", vencimento, formato)?;
        }
        registros.push(detalhe.finalizar(registros.len() + 1)?);
    }

    let mut trailer = layout.trailer.registro();
    trailer
        .preencher("tipo_registro", "9")?
        .numero("quantidade_titulos", ocorrencias.len() as u64)?
        .numero("valor_total_pago", soma_pago)?;
    registros.push(trailer.finalizar(registros.len() + 1)?);

    codificar_registros(&registros, config.arquivo.codificacao)
}
