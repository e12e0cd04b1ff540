use chrono::{Months, NaiveDate};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{
    Boleto, CobrancaError, CobrancaResult, ConfigBanco, ConfigCobranca, PoliticaNossoNumero,
    RE_CODIGO_BARRAS, RE_LINHA_DIGITAVEL, RepositorioBoletos, StatusBoleto, VALOR_MAXIMO_CENTAVOS,
    apenas_digitos, centavos_em_valor, fator_vencimento, modulo10, modulo11, somente_digitos,
    valor_em_centavos,
};

pub const TAMANHO_NOSSO_NUMERO: usize = 11;
const MAIOR_NOSSO_NUMERO: u64 = 99_999_999_999;
/// Código da moeda Real no código de barras.
const CODIGO_MOEDA: char = '9';

/// Campo livre (25 posições): convênio(7) + nosso número(11) + carteira(3) + agência(4).
pub fn campo_livre(banco: &ConfigBanco, nosso_numero: &str) -> CobrancaResult<String> {
    if nosso_numero.len() != TAMANHO_NOSSO_NUMERO || !apenas_digitos(nosso_numero) {
        return Err(CobrancaError::Validation(format!(
            "nosso número deve ter {TAMANHO_NOSSO_NUMERO} dígitos: <{nosso_numero}>"
        )));
    }

    Ok(format!(
        "{:0>7}{}{:0>3}{:0>4}",
        banco.codigo_convenio, nosso_numero, banco.carteira, banco.agencia
    ))
}

/// Código de barras de 44 dígitos.
///
/// banco(3) + moeda(1) + DV geral(1) + fator de vencimento(4) + valor(10) + campo livre(25)
///
/// ### Exemplo
/// ```
/// use cobranca_cnab::{ConfigBanco, gerar_codigo_barras};
/// use chrono::NaiveDate;
/// use rust_decimal::Decimal;
///
/// let banco = ConfigBanco {
///     codigo_banco: "237".into(),
///     codigo_convenio: "1234567".into(),
///     carteira: "109".into(),
///     agencia: "0001".into(),
///     ..Default::default()
/// };
/// let vencimento = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
/// let codigo = gerar_codigo_barras(&banco, "00000000001", vencimento, Decimal::new(100, 0)).unwrap();
///
/// assert_eq!(codigo, "23791959100000100001234567000000000011090001");
/// ```
pub fn gerar_codigo_barras(
    banco: &ConfigBanco,
    nosso_numero: &str,
    vencimento: NaiveDate,
    valor: Decimal,
) -> CobrancaResult<String> {
    banco.validar()?;

    let centavos = valor_em_centavos(valor)?;
    if centavos > VALOR_MAXIMO_CENTAVOS {
        return Err(CobrancaError::Validation(format!(
            "valor {valor} excede o máximo representável no código de barras"
        )));
    }

    let fator = fator_vencimento(vencimento)?;
    let livre = campo_livre(banco, nosso_numero)?;

    let sem_dv = format!(
        "{}{CODIGO_MOEDA}{fator:04}{centavos:010}{livre}",
        banco.codigo_banco
    );
    if sem_dv.len() != 43 || !apenas_digitos(&sem_dv) {
        return Err(CobrancaError::Validation(format!(
            "código de barras sem DV deve ter 43 dígitos: <{sem_dv}>"
        )));
    }
    let dv = modulo11(&sem_dv)?;

    Ok(format!("{}{dv}{}", &sem_dv[..4], &sem_dv[4..]))
}

/// Linha digitável de 47 dígitos derivada do código de barras.
///
/// Campos 1 a 3 carregam o campo livre, cada um seguido do seu DV módulo 10;
/// campo 4 é o DV geral; campo 5 é fator de vencimento + valor.
pub fn gerar_linha_digitavel(codigo_barras: &str) -> CobrancaResult<String> {
    validar_codigo_barras(codigo_barras)?;

    let livre = &codigo_barras[19..44];
    let campo1 = format!("{}{}", &codigo_barras[..4], &livre[..5]);
    let campo2 = &livre[5..15];
    let campo3 = &livre[15..25];

    Ok(format!(
        "{campo1}{}{campo2}{}{campo3}{}{}{}",
        modulo10(&campo1)?,
        modulo10(campo2)?,
        modulo10(campo3)?,
        &codigo_barras[4..5],
        &codigo_barras[5..19],
    ))
}

/// Confere tamanho e DV geral de um código de barras.
pub fn validar_codigo_barras(codigo_barras: &str) -> CobrancaResult<()> {
    if !RE_CODIGO_BARRAS.is_match(codigo_barras) {
        return Err(CobrancaError::Validation(format!(
            "código de barras deve ter 44 dígitos: <{codigo_barras}>"
        )));
    }

    let sem_dv = format!("{}{}", &codigo_barras[..4], &codigo_barras[5..]);
    let esperado = modulo11(&sem_dv)?;
    let informado = codigo_barras.as_bytes()[4] - b'0';

    if esperado != informado {
        return Err(CobrancaError::Validation(format!(
            "DV geral do código de barras inválido: informado {informado}, esperado {esperado}"
        )));
    }

    Ok(())
}

/// Reconstrói o código de barras a partir da linha digitável, sem conferir DVs.
pub fn linha_digitavel_para_codigo_barras(linha: &str) -> CobrancaResult<String> {
    let linha = somente_digitos(linha);
    if !RE_LINHA_DIGITAVEL.is_match(&linha) {
        return Err(CobrancaError::Validation(format!(
            "linha digitável deve ter 47 dígitos: <{linha}>"
        )));
    }

    Ok(format!(
        "{}{}{}{}{}{}",
        &linha[0..4],
        &linha[32..33],
        &linha[33..47],
        &linha[4..9],
        &linha[10..20],
        &linha[21..31],
    ))
}

/// Confere os três DVs módulo 10 e o DV geral. Aceita pontos e espaços.
/// Retorna o código de barras correspondente.
pub fn validar_linha_digitavel(linha: &str) -> CobrancaResult<String> {
    let codigo_barras = linha_digitavel_para_codigo_barras(linha)?;
    let linha = somente_digitos(linha);

    let campos = [(0..9, 9), (10..20, 20), (21..31, 31)];
    for (n, (faixa, posicao_dv)) in campos.into_iter().enumerate() {
        let esperado = modulo10(&linha[faixa])?;
        let informado = linha.as_bytes()[posicao_dv] - b'0';
        if esperado != informado {
            return Err(CobrancaError::Validation(format!(
                "DV do campo {} da linha digitável inválido: informado {informado}, esperado {esperado}",
                n + 1
            )));
        }
    }

    validar_codigo_barras(&codigo_barras)?;
    Ok(codigo_barras)
}

/// Forma de exibição: `AAAAA.AAAAA BBBBB.BBBBBB CCCCC.CCCCCC D EEEEEEEEEEEEEE`.
pub fn formatar_linha_digitavel(linha: &str) -> CobrancaResult<String> {
    let l = somente_digitos(linha);
    if !RE_LINHA_DIGITAVEL.is_match(&l) {
        return Err(CobrancaError::Validation(format!(
            "linha digitável deve ter 47 dígitos: <{l}>"
        )));
    }

    Ok(format!(
        "{}.{} {}.{} {}.{} {} {}",
        &l[0..5],
        &l[5..10],
        &l[10..15],
        &l[15..21],
        &l[21..26],
        &l[26..32],
        &l[32..33],
        &l[33..47],
    ))
}

/// Dados de um boleto ainda sem identificadores.
#[derive(Debug, Clone, PartialEq)]
pub struct NovoBoleto {
    /// Identificador externo; ausente gera um UUID.
    pub id: Option<String>,
    pub cliente_id: String,
    pub contrato_id: String,
    pub valor: Decimal,
    pub data_vencimento: NaiveDate,
    pub numero_parcela: u32,
    pub descricao: String,
    pub nome_pagador: String,
    pub documento_pagador: String,
    pub data_geracao: NaiveDate,
}

/// Parcelamento de um contrato em boletos mensais.
#[derive(Debug, Clone)]
pub struct PlanoParcelas {
    pub cliente_id: String,
    pub contrato_id: String,
    pub valor_total: Decimal,
    pub quantidade: u32,
    pub primeiro_vencimento: NaiveDate,
    pub descricao: String,
    pub nome_pagador: String,
    pub documento_pagador: String,
    pub data_geracao: NaiveDate,
}

/// Divide o valor do contrato em parcelas com centavos exatos.
/// A diferença do arredondamento fica na última parcela.
pub fn gerar_parcelas(plano: &PlanoParcelas) -> CobrancaResult<Vec<NovoBoleto>> {
    if plano.quantidade == 0 {
        return Err(CobrancaError::Validation(
            "quantidade de parcelas deve ser positiva".into(),
        ));
    }

    let total = valor_em_centavos(plano.valor_total)?;
    let n = u64::from(plano.quantidade);
    let base = total / n;

    if base == 0 {
        return Err(CobrancaError::Validation(format!(
            "valor {} insuficiente para {} parcelas",
            plano.valor_total, plano.quantidade
        )));
    }

    (0..plano.quantidade)
        .map(|i| {
            let centavos = if i + 1 == plano.quantidade {
                total - base * (n - 1)
            } else {
                base
            };

            let vencimento = plano
                .primeiro_vencimento
                .checked_add_months(Months::new(i))
                .ok_or_else(|| {
                    CobrancaError::Validation(format!("vencimento da parcela {} fora do calendário", i + 1))
                })?;

            Ok(NovoBoleto {
                id: None,
                cliente_id: plano.cliente_id.clone(),
                contrato_id: plano.contrato_id.clone(),
                valor: centavos_em_valor(centavos),
                data_vencimento: vencimento,
                numero_parcela: i + 1,
                descricao: format!("{} - parcela {}/{}", plano.descricao, i + 1, plano.quantidade),
                nome_pagador: plano.nome_pagador.clone(),
                documento_pagador: plano.documento_pagador.clone(),
                data_geracao: plano.data_geracao,
            })
        })
        .collect()
}

/// Gerador de boletos de um convênio.
///
/// O nosso número é sempre conferido contra o repositório antes de ser aceito.
pub struct GeradorBoletos<'a> {
    config: &'a ConfigCobranca,
    proximo: u64,
    rng: StdRng,
}

impl<'a> GeradorBoletos<'a> {
    pub fn new(config: &'a ConfigCobranca) -> CobrancaResult<Self> {
        Self::com_rng(config, StdRng::from_os_rng())
    }

    /// Gerador com sorteio reprodutível.
    pub fn com_semente(config: &'a ConfigCobranca, semente: u64) -> CobrancaResult<Self> {
        Self::com_rng(config, StdRng::seed_from_u64(semente))
    }

    fn com_rng(config: &'a ConfigCobranca, rng: StdRng) -> CobrancaResult<Self> {
        config.validar()?;

        let proximo = match config.identificador {
            PoliticaNossoNumero::Sequencial { proximo } => proximo,
            PoliticaNossoNumero::Aleatorio { .. } => 0,
        };

        Ok(Self {
            config,
            proximo,
            rng,
        })
    }

    /// Próximo valor da sequência, a ser persistido pelo chamador.
    pub fn proximo_sequencial(&self) -> u64 {
        self.proximo
    }

    pub fn gerar_nosso_numero<R>(&mut self, repo: &R) -> CobrancaResult<String>
    where
        R: RepositorioBoletos + ?Sized,
    {
        match self.config.identificador {
            PoliticaNossoNumero::Sequencial { .. } => {
                if self.proximo > MAIOR_NOSSO_NUMERO {
                    return Err(CobrancaError::InvalidConfiguration(format!(
                        "sequência de nosso número esgotada: {}",
                        self.proximo
                    )));
                }

                let candidato = format!("{:011}", self.proximo);

                // Colisão na sequência indica numeração corrompida: não há nova tentativa.
                if repo.buscar_por_nosso_numero(&candidato)?.is_some() {
                    warn!("nosso número sequencial {candidato} já existe no repositório");
                    return Err(CobrancaError::IdentifierCollision {
                        nosso_numero: candidato,
                        tentativas: 1,
                    });
                }

                self.proximo += 1;
                Ok(candidato)
            }
            PoliticaNossoNumero::Aleatorio { tentativas } => {
                let mut ultimo = String::new();

                for tentativa in 1..=tentativas {
                    let candidato = format!("{:011}", self.rng.random_range(1..=MAIOR_NOSSO_NUMERO));

                    if repo.buscar_por_nosso_numero(&candidato)?.is_none() {
                        return Ok(candidato);
                    }

                    debug!("colisão do nosso número {candidato} na tentativa {tentativa}");
                    ultimo = candidato;
                }

                Err(CobrancaError::IdentifierCollision {
                    nosso_numero: ultimo,
                    tentativas,
                })
            }
        }
    }

    /// Gera os identificadores, registra o boleto no repositório e o devolve.
    pub fn gerar_boleto<R>(&mut self, novo: NovoBoleto, repo: &mut R) -> CobrancaResult<Boleto>
    where
        R: RepositorioBoletos + ?Sized,
    {
        if novo.valor <= Decimal::ZERO {
            return Err(CobrancaError::Validation(format!(
                "valor do boleto deve ser positivo: {}",
                novo.valor
            )));
        }

        let documento = somente_digitos(&novo.documento_pagador).into_owned();
        if !matches!(documento.len(), 11 | 14) {
            return Err(CobrancaError::Validation(format!(
                "documento do pagador deve ser CPF (11) ou CNPJ (14): <{}>",
                novo.documento_pagador
            )));
        }

        let nosso_numero = self.gerar_nosso_numero(&*repo)?;
        let codigo_barras = gerar_codigo_barras(
            &self.config.banco,
            &nosso_numero,
            novo.data_vencimento,
            novo.valor,
        )?;
        let linha_digitavel = gerar_linha_digitavel(&codigo_barras)?;

        let boleto = Boleto {
            id: novo.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            cliente_id: novo.cliente_id,
            contrato_id: novo.contrato_id,
            valor: novo.valor,
            data_vencimento: novo.data_vencimento,
            numero_parcela: novo.numero_parcela,
            descricao: novo.descricao,
            nome_pagador: novo.nome_pagador,
            documento_pagador: documento,
            nosso_numero,
            linha_digitavel,
            codigo_barras,
            status: StatusBoleto::Gerado,
            data_geracao: novo.data_geracao,
            data_pagamento: None,
            valor_pago: None,
            forma_pagamento: None,
            data_cancelamento: None,
            comprovante: None,
        };

        repo.inserir(boleto.clone())?;
        debug!("boleto {} gerado (nosso número {})", boleto.id, boleto.nosso_numero);

        Ok(boleto)
    }
}
