use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::{
    Boleto, CobrancaError, CobrancaResult, ConfigBanco, ConfigCobranca, LayoutRegistro,
    StatusBoleto, TAMANHO_NOSSO_NUMERO, apenas_digitos, centavos_em_valor, codificar_registros,
    decodificar_registros, gerar_codigo_barras, normalizar_texto, validar_codigo_barras,
    valor_em_centavos,
};

pub const TIPO_HEADER: char = '0';
pub const TIPO_DETALHE: char = '1';
pub const TIPO_TRAILER: char = '9';

const MAIOR_SEQUENCIAL_ARQUIVO: u32 = 9_999_999;
const TAMANHO_NUMERO_DOCUMENTO: usize = 10;
/// Espécie do título: 99 = outros.
const ESPECIE_TITULO: &str = "99";

/// Tabelas de campos dos três tipos de registro de um arquivo.
#[derive(Debug, Clone)]
pub struct LayoutArquivo {
    pub header: LayoutRegistro,
    pub detalhe: LayoutRegistro,
    pub trailer: LayoutRegistro,
}

/// Layout da remessa para a largura e o formato de data configurados.
pub fn layout_remessa(config: &ConfigCobranca) -> CobrancaResult<LayoutArquivo> {
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
        .numerico("sequencial_arquivo", 7)
        .fechar()?;

    let detalhe = LayoutRegistro::novo(largura)
        .numerico("tipo_registro", 1)
        .numerico("agencia", 4)
        .numerico("carteira", 3)
        .numerico("codigo_convenio", 7)
        .numerico("nosso_numero", TAMANHO_NOSSO_NUMERO)
        .alfa("numero_documento", TAMANHO_NUMERO_DOCUMENTO)
        .numerico("data_vencimento", data)
        .numerico("valor_titulo", 13)
        .numerico("codigo_banco", 3)
        .numerico("especie_titulo", 2)
        .numerico("data_emissao", data)
        .numerico("tipo_inscricao", 2)
        .numerico("inscricao_pagador", 14)
        .alfa("nome_pagador", 40)
        .numerico("codigo_barras", 44)
        .fechar()?;

    let trailer = LayoutRegistro::novo(largura)
        .numerico("tipo_registro", 1)
        .numerico("quantidade_registros", 6)
        .numerico("valor_total", 13)
        .fechar()?;

    Ok(LayoutArquivo {
        header,
        detalhe,
        trailer,
    })
}

/// Parâmetros do lote fornecidos pelo chamador (relógio e numeração).
#[derive(Debug, Clone, Copy)]
pub struct ParametrosLote {
    pub sequencial: u32,
    pub gerado_em: NaiveDateTime,
}

/// Arquivo de remessa pronto para envio ao banco.
#[derive(Debug, Clone)]
pub struct ArquivoRemessa {
    pub conteudo: Vec<u8>,
    pub nome_arquivo: String,
    pub sequencial: u32,
    pub gerado_em: NaiveDateTime,
    pub nossos_numeros: Vec<String>,
    pub quantidade_titulos: usize,
    /// Header + detalhes + trailer.
    pub quantidade_registros: usize,
    pub valor_total: Decimal,
    pub impressao_digital: String,
}

pub fn nome_arquivo_remessa(gerado_em: NaiveDateTime) -> String {
    gerado_em.format("REM%Y%m%d%H%M%S.rem").to_string()
}

/// Tipo de inscrição CNAB: 01 = CPF, 02 = CNPJ.
fn tipo_inscricao(documento: &str) -> Option<&'static str> {
    match documento.len() {
        11 => Some("01"),
        14 => Some("02"),
        _ => None,
    }
}

/// Número do documento com até 10 posições.
///
/// O sufixo `/parcela` é sempre preservado; do contrato ficam apenas os
/// últimos caracteres que couberem. Contratos longos (ex.: UUIDs) deixam de
/// ser identificáveis por este campo: o título é localizado no retorno pelo
/// nosso número.
fn numero_documento(boleto: &Boleto) -> String {
    let parcela = format!("/{}", boleto.numero_parcela);
    // Texto normalizado contém apenas ASCII.
    let contrato = normalizar_texto(&boleto.contrato_id);
    let cabe = TAMANHO_NUMERO_DOCUMENTO.saturating_sub(parcela.len());
    let inicio = contrato.len().saturating_sub(cabe);

    format!("{}{parcela}", &contrato[inicio..])
}

/// Pré-condições do lote inteiro. Qualquer falha rejeita a remessa.
fn validar_lote(boletos: &[Boleto], banco: &ConfigBanco) -> CobrancaResult<()> {
    if boletos.is_empty() {
        return Err(CobrancaError::Validation(
            "nenhum boleto selecionado para a remessa".into(),
        ));
    }

    let inelegiveis: Vec<String> = boletos
        .iter()
        .filter(|b| b.status != StatusBoleto::Gerado)
        .map(|b| format!("{} ({})", b.nosso_numero, b.status))
        .collect();

    if !inelegiveis.is_empty() {
        return Err(CobrancaError::Validation(format!(
            "boletos fora do status gerado: {}",
            inelegiveis.join(", ")
        )));
    }

    let mut vistos = HashSet::with_capacity(boletos.len());

    for boleto in boletos {
        if !vistos.insert(boleto.nosso_numero.as_str()) {
            return Err(CobrancaError::Validation(format!(
                "nosso número repetido no lote: {}",
                boleto.nosso_numero
            )));
        }

        if boleto.nosso_numero.len() != TAMANHO_NOSSO_NUMERO || !apenas_digitos(&boleto.nosso_numero) {
            return Err(CobrancaError::Validation(format!(
                "boleto {} sem nosso número válido",
                boleto.id
            )));
        }

        if boleto.valor <= Decimal::ZERO {
            return Err(CobrancaError::Validation(format!(
                "boleto {}: valor deve ser positivo, encontrado {}",
                boleto.nosso_numero, boleto.valor
            )));
        }

        // O código de barras precisa refletir valor, vencimento e nosso número do detalhe.
        validar_codigo_barras(&boleto.codigo_barras)?;
        let esperado = gerar_codigo_barras(
            banco,
            &boleto.nosso_numero,
            boleto.data_vencimento,
            boleto.valor,
        )?;
        if boleto.codigo_barras != esperado {
            return Err(CobrancaError::Validation(format!(
                "boleto {}: código de barras <{}> diverge do esperado <{esperado}>",
                boleto.nosso_numero, boleto.codigo_barras
            )));
        }

        if tipo_inscricao(&boleto.documento_pagador).is_none()
            || !apenas_digitos(&boleto.documento_pagador)
        {
            return Err(CobrancaError::Validation(format!(
                "boleto {}: documento do pagador inválido <{}>",
                boleto.nosso_numero, boleto.documento_pagador
            )));
        }
    }

    Ok(())
}

/// Codifica os boletos gerados em um arquivo de remessa.
///
/// O lote é rejeitado por inteiro se vazio ou se algum boleto não estiver
/// no status `gerado`; nada é codificado nesse caso.
pub fn codificar_remessa(
    boletos: &[Boleto],
    config: &ConfigCobranca,
    lote: ParametrosLote,
) -> CobrancaResult<ArquivoRemessa> {
    config.validar()?;
    validar_lote(boletos, &config.banco)?;

    if lote.sequencial == 0 || lote.sequencial > MAIOR_SEQUENCIAL_ARQUIVO {
        return Err(CobrancaError::Validation(format!(
            "sequencial de remessa fora do intervalo 1..={MAIOR_SEQUENCIAL_ARQUIVO}: {}",
            lote.sequencial
        )));
    }

    let layout = layout_remessa(config)?;
    let banco = &config.banco;
    let formato = config.arquivo.formato_data;

    let mut registros = Vec::with_capacity(boletos.len() + 2);
    let mut sequencia = 0;
    let mut proximo = || {
        sequencia += 1;
        sequencia
    };

    // 1. Header
    let mut header = layout.header.registro();
    header
        .preencher("tipo_registro", "0")?
        .preencher("operacao", "1")?
        .preencher("literal_operacao", "REMESSA")?
        .preencher("codigo_servico", "01")?
        .preencher("literal_servico", "COBRANCA")?
        .preencher("codigo_convenio", &banco.codigo_convenio)?
        .preencher("nome_empresa", &banco.nome_empresa)?
        .preencher("codigo_banco", &banco.codigo_banco)?
        .preencher("nome_banco", &banco.nome_banco)?
        .data("data_gravacao", lote.gerado_em.date(), formato)?
        .numero("sequencial_arquivo", u64::from(lote.sequencial))?;
    registros.push(header.finalizar(proximo())?);

    // 2. Detalhes
    let mut total_centavos: u64 = 0;

    for boleto in boletos {
        let centavos = valor_em_centavos(boleto.valor)?;
        total_centavos += centavos;

        let documento = numero_documento(boleto);
        let inscricao = tipo_inscricao(&boleto.documento_pagador).unwrap_or("00");

        let mut detalhe = layout.detalhe.registro();
        detalhe
            .preencher("tipo_registro", "1")?
            .preencher("agencia", &banco.agencia)?
            .preencher("carteira", &banco.carteira)?
            .preencher("codigo_convenio", &banco.codigo_convenio)?
            .preencher("nosso_numero", &boleto.nosso_numero)?
            .preencher("numero_documento", &documento)?
            .data("data_vencimento", boleto.data_vencimento, formato)?
            .numero("valor_titulo", centavos)?
            .preencher("codigo_banco", &banco.codigo_banco)?
            .preencher("especie_titulo", ESPECIE_TITULO)?
            .data("data_emissao", boleto.data_geracao, formato)?
            .preencher("tipo_inscricao", inscricao)?
            .preencher("inscricao_pagador", &boleto.documento_pagador)?
            .preencher("nome_pagador", &boleto.nome_pagador)?
            .preencher("codigo_barras", &boleto.codigo_barras)?;
        registros.push(detalhe.finalizar(proximo())?);

        debug!("remessa: título {} incluído", boleto.nosso_numero);
    }

    // 3. Trailer: declara o total de registros, inclusive ele mesmo.
    let sequencia_trailer = proximo();
    let mut trailer = layout.trailer.registro();
    trailer
        .preencher("tipo_registro", "9")?
        .numero("quantidade_registros", sequencia_trailer as u64)?
        .numero("valor_total", total_centavos)?;
    registros.push(trailer.finalizar(sequencia_trailer)?);

    assert_eq!(
        sequencia_trailer,
        registros.len(),
        "trailer da remessa diverge da quantidade de registros codificados"
    );
    assert_eq!(registros.len(), boletos.len() + 2);

    let conteudo = codificar_registros(&registros, config.arquivo.codificacao)?;
    let impressao_digital = blake3::hash(&conteudo).to_hex().to_string();
    let valor_total = boletos.iter().map(|b| b.valor).sum::<Decimal>();

    let arquivo = ArquivoRemessa {
        nome_arquivo: nome_arquivo_remessa(lote.gerado_em),
        sequencial: lote.sequencial,
        gerado_em: lote.gerado_em,
        nossos_numeros: boletos.iter().map(|b| b.nosso_numero.clone()).collect(),
        quantidade_titulos: boletos.len(),
        quantidade_registros: registros.len(),
        valor_total,
        impressao_digital,
        conteudo,
    };

    info!(
        "remessa {} gerada: {} títulos, valor total {}",
        arquivo.nome_arquivo, arquivo.quantidade_titulos, arquivo.valor_total
    );

    Ok(arquivo)
}

/// Título lido de um arquivo de remessa.
#[derive(Debug, Clone, PartialEq)]
pub struct TituloRemessa {
    pub nosso_numero: String,
    pub numero_documento: String,
    pub data_vencimento: NaiveDate,
    pub valor: Decimal,
    pub nome_pagador: String,
    pub codigo_barras: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemessaLida {
    pub codigo_banco: String,
    pub sequencial: u32,
    pub data_gravacao: Option<NaiveDate>,
    pub titulos: Vec<TituloRemessa>,
    pub quantidade_registros: usize,
    pub valor_total: Decimal,
}

/// Lê uma remessa com as mesmas tabelas de campos usadas na codificação.
///
/// Diferente do retorno, aqui qualquer inconsistência interrompe a leitura.
pub fn ler_remessa(conteudo: &[u8], config: &ConfigCobranca) -> CobrancaResult<RemessaLida> {
    let layout = layout_remessa(config)?;
    let formato = config.arquivo.formato_data;
    let linhas = decodificar_registros(
        conteudo,
        config.arquivo.codificacao,
        config.arquivo.largura_registro,
    );

    if linhas.is_empty() {
        return Err(CobrancaError::Validation("arquivo de remessa vazio".into()));
    }

    let mut remessa: Option<RemessaLida> = None;
    let mut trailer: Option<(usize, u64, u64)> = None;
    let mut soma_centavos: u64 = 0;

    for (numero, texto) in &linhas {
        let numero = *numero;
        let texto = match texto {
            Ok(texto) => texto.as_str(),
            Err(e) => return Err(CobrancaError::malformado(numero, e.to_string())),
        };

        if trailer.is_some() {
            return Err(CobrancaError::malformado(numero, "registro após o trailer"));
        }

        match texto.chars().next() {
            Some(TIPO_HEADER) if remessa.is_none() => {
                let registro = layout.header.ler(texto, numero)?;
                if registro.digitos("operacao")? != "1" {
                    return Err(CobrancaError::malformado(numero, "header não é de remessa"));
                }
                remessa = Some(RemessaLida {
                    codigo_banco: registro.digitos("codigo_banco")?.to_string(),
                    sequencial: registro.numero("sequencial_arquivo")? as u32,
                    data_gravacao: registro.data("data_gravacao", formato)?,
                    titulos: Vec::new(),
                    quantidade_registros: 0,
                    valor_total: Decimal::ZERO,
                });
            }
            Some(TIPO_DETALHE) if remessa.is_some() => {
                let registro = layout.detalhe.ler(texto, numero)?;
                let centavos = registro.numero("valor_titulo")?;
                soma_centavos += centavos;

                let titulo = TituloRemessa {
                    nosso_numero: registro.digitos("nosso_numero")?.to_string(),
                    numero_documento: registro.texto("numero_documento")?.to_string(),
                    data_vencimento: registro.data("data_vencimento", formato)?.ok_or_else(|| {
                        CobrancaError::malformado(numero, "vencimento não informado")
                    })?,
                    valor: centavos_em_valor(centavos),
                    nome_pagador: registro.texto("nome_pagador")?.to_string(),
                    codigo_barras: registro.digitos("codigo_barras")?.to_string(),
                };

                if let Some(lida) = remessa.as_mut() {
                    lida.titulos.push(titulo);
                }
            }
            Some(TIPO_TRAILER) if remessa.is_some() => {
                let registro = layout.trailer.ler(texto, numero)?;
                trailer = Some((
                    numero,
                    registro.numero("quantidade_registros")?,
                    registro.numero("valor_total")?,
                ));
            }
            tipo => {
                return Err(CobrancaError::malformado(
                    numero,
                    format!("tipo de registro inesperado: {tipo:?}"),
                ));
            }
        }
    }

    let mut remessa = remessa.ok_or_else(|| CobrancaError::malformado(1, "header ausente"))?;
    let (linha_trailer, declarados, valor_declarado) =
        trailer.ok_or_else(|| CobrancaError::malformado(linhas.len(), "trailer ausente"))?;

    if declarados != linha_trailer as u64 {
        return Err(CobrancaError::ControlTotalMismatch {
            campo: "quantidade_registros",
            declarado: declarados.to_string(),
            apurado: linha_trailer.to_string(),
        });
    }
    if valor_declarado != soma_centavos {
        return Err(CobrancaError::ControlTotalMismatch {
            campo: "valor_total",
            declarado: centavos_em_valor(valor_declarado).to_string(),
            apurado: centavos_em_valor(soma_centavos).to_string(),
        });
    }

    remessa.quantidade_registros = linha_trailer;
    remessa.valor_total = centavos_em_valor(soma_centavos);
    Ok(remessa)
}
