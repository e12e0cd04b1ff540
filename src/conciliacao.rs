use std::{collections::BTreeMap, fmt};
use tracing::{debug, info, warn};

use crate::{
    AtualizacaoBoleto, Boleto, CobrancaError, ConfigCobranca, FormaPagamento, LoteRetorno,
    RegistroRetorno, RepositorioBoletos, StatusBoleto, StatusRetorno, decodificar_retorno,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotivoFalha {
    BoletoNotFound,
    StateConflict {
        atual: StatusBoleto,
        pretendido: StatusBoleto,
    },
    OcorrenciaDesconhecida(String),
    /// Dados do registro recusados pela regra de negócio do boleto.
    Validacao(String),
    /// Erro devolvido pelo repositório na consulta ou na atualização.
    Repositorio(String),
}

impl fmt::Display for MotivoFalha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotivoFalha::BoletoNotFound => f.write_str("BoletoNotFound"),
            MotivoFalha::StateConflict { atual, pretendido } => {
                write!(f, "StateConflict ({atual} -> {pretendido})")
            }
            MotivoFalha::OcorrenciaDesconhecida(codigo) => {
                write!(f, "OcorrenciaDesconhecida ({codigo})")
            }
            MotivoFalha::Validacao(msg) => write!(f, "Validacao ({msg})"),
            MotivoFalha::Repositorio(msg) => write!(f, "Repositorio ({msg})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sucesso {
    pub nosso_numero: String,
    pub novo_status: StatusBoleto,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Falha {
    pub nosso_numero: String,
    /// Linha do registro no arquivo de retorno.
    pub linha: usize,
    pub erro: MotivoFalha,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultadoConciliacao {
    pub sucesso: Vec<Sucesso>,
    pub falha: Vec<Falha>,
    pub ja_aplicados: Vec<String>,
}

impl ResultadoConciliacao {
    pub fn total(&self) -> usize {
        self.sucesso.len() + self.falha.len() + self.ja_aplicados.len()
    }
}

enum Desfecho {
    Aplicar(AtualizacaoBoleto),
    JaAplicado,
}

/// Decide a atualização para um registro, sem tocar no repositório.
fn avaliar(registro: &RegistroRetorno, boleto: &Boleto) -> Result<Desfecho, MotivoFalha> {
    let transicao = match &registro.status {
        StatusRetorno::Pago => {
            let data = registro.data_pagamento.unwrap_or(registro.data_ocorrencia);
            let valor = registro.valor_pago.unwrap_or(boleto.valor);

            if boleto.status == StatusBoleto::Pago {
                return if boleto.data_pagamento == Some(data) && boleto.valor_pago == Some(valor) {
                    Ok(Desfecho::JaAplicado)
                } else {
                    // Segundo pagamento divergente para um título já baixado.
                    Err(MotivoFalha::StateConflict {
                        atual: StatusBoleto::Pago,
                        pretendido: StatusBoleto::Pago,
                    })
                };
            }

            boleto.registrar_pagamento(data, Some(valor), Some(FormaPagamento::Boleto))
        }
        StatusRetorno::Cancelado => boleto.cancelar(registro.data_ocorrencia),
        StatusRetorno::Vencido => boleto.marcar_vencido(),
        StatusRetorno::Desconhecido(codigo) => {
            return Err(MotivoFalha::OcorrenciaDesconhecida(codigo.clone()));
        }
    };

    match transicao {
        Ok(atualizacao) => Ok(Desfecho::Aplicar(atualizacao)),
        Err(CobrancaError::AlreadyApplied(_)) => Ok(Desfecho::JaAplicado),
        Err(CobrancaError::StateConflict { .. }) => Err(MotivoFalha::StateConflict {
            atual: boleto.status,
            pretendido: match registro.status {
                StatusRetorno::Pago => StatusBoleto::Pago,
                StatusRetorno::Cancelado => StatusBoleto::Cancelado,
                _ => StatusBoleto::Vencido,
            },
        }),
        Err(e) => Err(MotivoFalha::Validacao(e.to_string())),
    }
}

/// Concilia um lote de retorno com o repositório, registro a registro.
///
/// Uma falha não impede o processamento dos demais registros. Reaplicar o
/// mesmo lote não altera o estado e lista os registros em `ja_aplicados`.
pub fn conciliar<R>(lote: &LoteRetorno, repo: &mut R) -> ResultadoConciliacao
where
    R: RepositorioBoletos + ?Sized,
{
    let mut resultado = ResultadoConciliacao::default();

    for registro in &lote.registros {
        let nosso_numero = registro.nosso_numero.clone();
        let falhar = |erro: MotivoFalha| Falha {
            nosso_numero: registro.nosso_numero.clone(),
            linha: registro.linha,
            erro,
        };

        if let StatusRetorno::Desconhecido(codigo) = &registro.status {
            warn!("conciliação: ocorrência {codigo} desconhecida para {nosso_numero}");
            resultado
                .falha
                .push(falhar(MotivoFalha::OcorrenciaDesconhecida(codigo.clone())));
            continue;
        }

        let boleto = match repo.buscar_por_nosso_numero(&nosso_numero) {
            Ok(Some(boleto)) => boleto,
            Ok(None) => {
                warn!("conciliação: boleto {nosso_numero} não encontrado");
                resultado.falha.push(falhar(MotivoFalha::BoletoNotFound));
                continue;
            }
            Err(e) => {
                resultado.falha.push(falhar(MotivoFalha::Repositorio(e.to_string())));
                continue;
            }
        };

        match avaliar(registro, &boleto) {
            Ok(Desfecho::JaAplicado) => {
                debug!("conciliação: {nosso_numero} já está {}", boleto.status);
                resultado.ja_aplicados.push(nosso_numero);
            }
            Ok(Desfecho::Aplicar(atualizacao)) => match repo.atualizar(&boleto.id, &atualizacao) {
                Ok(atualizado) => {
                    debug!(
                        "conciliação: {nosso_numero} {} -> {}",
                        boleto.status, atualizado.status
                    );
                    resultado.sucesso.push(Sucesso {
                        nosso_numero,
                        novo_status: atualizado.status,
                    });
                }
                Err(e) => resultado.falha.push(falhar(MotivoFalha::Repositorio(e.to_string()))),
            },
            Err(motivo) => {
                warn!("conciliação: {nosso_numero} recusado: {motivo}");
                resultado.falha.push(falhar(motivo));
            }
        }
    }

    info!(
        "retorno {} conciliado: {} sucesso, {} falha, {} já aplicados",
        lote.protocolo,
        resultado.sucesso.len(),
        resultado.falha.len(),
        resultado.ja_aplicados.len()
    );

    resultado
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SituacaoProcessamento {
    ProcessadoComSucesso,
    /// Lote processado, com erros de leitura ou de conciliação em registros.
    ProcessadoComErros,
    /// Arquivo recusado por inteiro; nenhum boleto foi alterado.
    Rejeitado(String),
}

/// Resumo entregue ao operador após o processamento de um retorno.
#[derive(Debug)]
pub struct RelatorioProcessamento {
    pub situacao: SituacaoProcessamento,
    pub protocolo: Option<u32>,
    pub impressao_digital: Option<String>,
    pub erros_leitura: Vec<CobrancaError>,
    pub conciliacao: ResultadoConciliacao,
    /// Parcelas pagas, por contrato afetado, apuradas após a conciliação.
    pub parcelas_pagas: BTreeMap<String, usize>,
}

/// Decodifica e concilia um arquivo de retorno, produzindo o relatório.
pub fn processar_retorno<R>(
    conteudo: &[u8],
    config: &ConfigCobranca,
    repo: &mut R,
) -> RelatorioProcessamento
where
    R: RepositorioBoletos + ?Sized,
{
    let decodificado = match decodificar_retorno(conteudo, config) {
        Ok(decodificado) => decodificado,
        Err(e) => {
            warn!("retorno rejeitado: {e}");
            return RelatorioProcessamento {
                situacao: SituacaoProcessamento::Rejeitado(e.to_string()),
                protocolo: None,
                impressao_digital: None,
                erros_leitura: Vec::new(),
                conciliacao: ResultadoConciliacao::default(),
                parcelas_pagas: BTreeMap::new(),
            };
        }
    };

    let lote = decodificado.lote;
    let conciliacao = conciliar(&lote, repo);

    let mut parcelas_pagas = BTreeMap::new();
    for sucesso in conciliacao
        .sucesso
        .iter()
        .filter(|s| s.novo_status == StatusBoleto::Pago)
    {
        let Ok(Some(boleto)) = repo.buscar_por_nosso_numero(&sucesso.nosso_numero) else {
            continue;
        };
        if parcelas_pagas.contains_key(&boleto.contrato_id) {
            continue;
        }
        match repo.parcelas_pagas(&boleto.contrato_id) {
            Ok(pagas) => {
                parcelas_pagas.insert(boleto.contrato_id, pagas);
            }
            Err(e) => warn!("parcelas pagas de {}: {e}", boleto.contrato_id),
        }
    }

    let situacao = if decodificado.erros.is_empty() && conciliacao.falha.is_empty() {
        SituacaoProcessamento::ProcessadoComSucesso
    } else {
        SituacaoProcessamento::ProcessadoComErros
    };

    RelatorioProcessamento {
        situacao,
        protocolo: Some(lote.protocolo),
        impressao_digital: Some(lote.impressao_digital),
        erros_leitura: decodificado.erros,
        conciliacao,
        parcelas_pagas,
    }
}
