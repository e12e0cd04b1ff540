use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CobrancaError, CobrancaResult};

/// Situação do boleto.
///
/// `Pago` e `Cancelado` são estados terminais.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBoleto {
    Gerado,
    Pago,
    Vencido,
    Cancelado,
}

impl StatusBoleto {
    pub fn eh_terminal(self) -> bool {
        matches!(self, StatusBoleto::Pago | StatusBoleto::Cancelado)
    }
}

impl fmt::Display for StatusBoleto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nome = match self {
            StatusBoleto::Gerado => "gerado",
            StatusBoleto::Pago => "pago",
            StatusBoleto::Vencido => "vencido",
            StatusBoleto::Cancelado => "cancelado",
        };
        f.write_str(nome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormaPagamento {
    Boleto,
    Pix,
    Transferencia,
    Dinheiro,
    Cartao,
}

/// Título de cobrança vinculado a uma parcela de contrato.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boleto {
    pub id: String,
    pub cliente_id: String,
    pub contrato_id: String,
    pub valor: Decimal,
    pub data_vencimento: NaiveDate,
    pub numero_parcela: u32,
    pub descricao: String,
    pub nome_pagador: String,
    pub documento_pagador: String,
    pub nosso_numero: String,
    pub linha_digitavel: String,
    pub codigo_barras: String,
    pub status: StatusBoleto,
    pub data_geracao: NaiveDate,
    pub data_pagamento: Option<NaiveDate>,
    pub valor_pago: Option<Decimal>,
    pub forma_pagamento: Option<FormaPagamento>,
    pub data_cancelamento: Option<NaiveDate>,
    pub comprovante: Option<String>,
}

/// Campos alterados por uma transição de estado já validada.
#[derive(Debug, Clone, PartialEq)]
pub struct AtualizacaoBoleto {
    pub status: StatusBoleto,
    pub data_pagamento: Option<NaiveDate>,
    pub valor_pago: Option<Decimal>,
    pub forma_pagamento: Option<FormaPagamento>,
    pub data_cancelamento: Option<NaiveDate>,
}

impl AtualizacaoBoleto {
    pub fn status(status: StatusBoleto) -> Self {
        Self {
            status,
            data_pagamento: None,
            valor_pago: None,
            forma_pagamento: None,
            data_cancelamento: None,
        }
    }
}

impl Boleto {
    /// Status observado na data informada: um boleto gerado com vencimento
    /// ultrapassado é apresentado como vencido, sem alterar o registro.
    pub fn status_em(&self, hoje: NaiveDate) -> StatusBoleto {
        match self.status {
            StatusBoleto::Gerado if self.data_vencimento < hoje => StatusBoleto::Vencido,
            status => status,
        }
    }

    /// Baixa por pagamento direto. `valor` ausente assume o valor do título.
    pub fn registrar_pagamento(
        &self,
        data: NaiveDate,
        valor: Option<Decimal>,
        forma: Option<FormaPagamento>,
    ) -> CobrancaResult<AtualizacaoBoleto> {
        self.exigir_transicao(StatusBoleto::Pago)?;

        let valor_pago = valor.unwrap_or(self.valor);
        if valor_pago <= Decimal::ZERO {
            return Err(CobrancaError::Validation(format!(
                "valor pago inválido para o boleto {}: {valor_pago}",
                self.nosso_numero
            )));
        }

        Ok(AtualizacaoBoleto {
            data_pagamento: Some(data),
            valor_pago: Some(valor_pago),
            forma_pagamento: forma,
            ..AtualizacaoBoleto::status(StatusBoleto::Pago)
        })
    }

    pub fn cancelar(&self, data: NaiveDate) -> CobrancaResult<AtualizacaoBoleto> {
        self.exigir_transicao(StatusBoleto::Cancelado)?;

        Ok(AtualizacaoBoleto {
            data_cancelamento: Some(data),
            ..AtualizacaoBoleto::status(StatusBoleto::Cancelado)
        })
    }

    pub fn marcar_vencido(&self) -> CobrancaResult<AtualizacaoBoleto> {
        self.exigir_transicao(StatusBoleto::Vencido)?;
        Ok(AtualizacaoBoleto::status(StatusBoleto::Vencido))
    }

    /// Aplica uma atualização produzida por uma transição validada.
    pub fn aplicar(&mut self, atualizacao: &AtualizacaoBoleto) {
        self.status = atualizacao.status;

        if atualizacao.data_pagamento.is_some() {
            self.data_pagamento = atualizacao.data_pagamento;
        }
        if atualizacao.valor_pago.is_some() {
            self.valor_pago = atualizacao.valor_pago;
        }
        if atualizacao.forma_pagamento.is_some() {
            self.forma_pagamento = atualizacao.forma_pagamento;
        }
        if atualizacao.data_cancelamento.is_some() {
            self.data_cancelamento = atualizacao.data_cancelamento;
        }
    }

    fn exigir_transicao(&self, destino: StatusBoleto) -> CobrancaResult<()> {
        if self.status == destino {
            return Err(CobrancaError::AlreadyApplied(self.nosso_numero.clone()));
        }

        if self.status.eh_terminal() {
            return Err(CobrancaError::StateConflict {
                nosso_numero: self.nosso_numero.clone(),
                atual: self.status.to_string(),
                pretendido: destino.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn boleto_de_teste(
    nosso_numero: &str,
    valor: Decimal,
    vencimento: NaiveDate,
) -> Boleto {
    Boleto {
        id: format!("id-{nosso_numero}"),
        cliente_id: "cliente-1".into(),
        contrato_id: "contrato-1".into(),
        valor,
        data_vencimento: vencimento,
        numero_parcela: 1,
        descricao: "Parcela do lote 12 quadra B".into(),
        nome_pagador: "José da Conceição".into(),
        documento_pagador: "12345678909".into(),
        nosso_numero: nosso_numero.into(),
        linha_digitavel: String::new(),
        codigo_barras: String::new(),
        status: StatusBoleto::Gerado,
        data_geracao: NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
        data_pagamento: None,
        valor_pago: None,
        forma_pagamento: None,
        data_cancelamento: None,
        comprovante: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(a: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(a, m, d).unwrap()
    }

    #[test]
    fn pagamento_assume_valor_do_titulo() {
        let mut boleto = boleto_de_teste("00000000001", Decimal::new(100, 0), data(2024, 1, 10));
        let atualizacao = boleto
            .registrar_pagamento(data(2024, 1, 12), None, Some(FormaPagamento::Pix))
            .unwrap();
        boleto.aplicar(&atualizacao);

        assert_eq!(boleto.status, StatusBoleto::Pago);
        assert_eq!(boleto.valor_pago, Some(Decimal::new(100, 0)));
        assert_eq!(boleto.data_pagamento, Some(data(2024, 1, 12)));
    }

    #[test]
    fn estados_terminais_nao_transitam() {
        let mut pago = boleto_de_teste("00000000001", Decimal::new(100, 0), data(2024, 1, 10));
        pago.status = StatusBoleto::Pago;
        assert!(matches!(
            pago.cancelar(data(2024, 2, 1)),
            Err(CobrancaError::StateConflict { .. })
        ));

        let mut cancelado = pago.clone();
        cancelado.status = StatusBoleto::Cancelado;
        assert!(matches!(
            cancelado.registrar_pagamento(data(2024, 2, 1), None, None),
            Err(CobrancaError::StateConflict { .. })
        ));
        assert!(matches!(
            cancelado.cancelar(data(2024, 2, 1)),
            Err(CobrancaError::AlreadyApplied(_))
        ));
    }

    #[test]
    fn vencido_e_derivado_da_data() {
        let boleto = boleto_de_teste("00000000001", Decimal::new(100, 0), data(2024, 1, 10));
        assert_eq!(boleto.status_em(data(2024, 1, 10)), StatusBoleto::Gerado);
        assert_eq!(boleto.status_em(data(2024, 1, 11)), StatusBoleto::Vencido);
        assert_eq!(boleto.status, StatusBoleto::Gerado);
    }

    #[test]
    fn boleto_vencido_ainda_pode_ser_pago() {
        let mut boleto = boleto_de_teste("00000000001", Decimal::new(100, 0), data(2024, 1, 10));
        boleto.aplicar(&boleto.marcar_vencido().unwrap());
        assert!(boleto.registrar_pagamento(data(2024, 2, 1), None, None).is_ok());
    }
}
