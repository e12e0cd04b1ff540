use chrono::{Local, NaiveDate, TimeDelta};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{info, warn};

use crate::{
    CobrancaError, CobrancaResult, Comando, Config, ConfigCobranca, DATA_BASE_FATOR, GeradorBoletos,
    MemoriaBoletos, OcorrenciaSimulada, ParametrosLote, PlanoParcelas, PoliticaNossoNumero,
    REGEX_ARQUIVO_REMESSA, RepositorioBoletos, SituacaoProcessamento, StatusRetorno, centavos_em_valor,
    codificar_remessa, codificar_retorno, decodificar_lotes, exportar_conciliacao,
    fmt_milhares, fmt_valor, formatar_linha_digitavel, gerar_linha_digitavel, gerar_parcelas,
    get_descricao_ocorrencia, get_nome_do_banco, imprimir_boletos, imprimir_relatorio_retorno,
    imprimir_resumo_remessa, ler_remessa, processar_retorno, somente_digitos,
    validar_codigo_barras, validar_linha_digitavel,
};

pub fn clear_screen(clear_screen: bool) -> CobrancaResult<()> {
    if clear_screen {
        if cfg!(target_os = "windows") {
            Command::new("cmd").args(["/c", "cls"]).status()?;
        } else {
            Command::new("clear").status()?;
        }
    }

    Ok(())
}

/// Exibe a descrição e a versão do programa.
pub fn imprimir_versao_do_programa() {
    let descr = [
        "Este programa gera boletos de cobrança (nosso número, código de barras e linha digitável).",
        "Os boletos gerados são enviados ao banco em arquivos de remessa de largura fixa (CNAB 240/400).",
        "Os arquivos de retorno do banco informam liquidações, baixas e vencimentos.",
        "A conciliação aplica o retorno ao cadastro de boletos sem duplicar baixas já registradas.",
    ];

    for line in &descr {
        println!(" {}", line);
    }

    println!("\n versão: {}\n", env!("CARGO_PKG_VERSION"));
}

/// Executa o subcomando escolhido na linha de comando.
pub fn executar(config: &Config) -> CobrancaResult<()> {
    let cobranca = &config.cobranca;

    match &config.comando {
        Comando::Gerar {
            cliente,
            contrato,
            valor_total,
            parcelas,
            vencimento,
            pagador,
            documento,
            descricao,
        } => {
            let plano = PlanoParcelas {
                cliente_id: cliente.clone(),
                contrato_id: contrato.clone(),
                valor_total: *valor_total,
                quantidade: *parcelas,
                primeiro_vencimento: *vencimento,
                descricao: descricao.clone(),
                nome_pagador: pagador.clone(),
                documento_pagador: documento.clone(),
                data_geracao: Local::now().date_naive(),
            };
            comando_gerar(&plano, cobranca, &config.boletos)
        }
        Comando::Remessa {
            ids,
            sequencial,
            saida,
        } => comando_remessa(ids, *sequencial, saida, cobranca, &config.boletos),
        Comando::Inspecionar { remessa, codigo } => match (remessa, codigo) {
            (Some(path), _) => inspecionar_remessa(path, cobranca),
            (None, Some(codigo)) => inspecionar_codigo(codigo),
            (None, None) => Err(CobrancaError::Validation(
                "informe --remessa ou --codigo".into(),
            )),
        },
        Comando::Simular {
            remessa,
            pagos,
            cancelados,
            data,
            protocolo,
            saida,
        } => comando_simular(remessa, pagos, cancelados, *data, *protocolo, saida, cobranca),
        Comando::Retorno { arquivos } => comando_retorno(arquivos, cobranca),
        Comando::Conciliar { arquivo, relatorio } => {
            comando_conciliar(arquivo, relatorio.as_deref(), cobranca, &config.boletos)
        }
    }
}

fn ler_arquivo(path: &Path) -> CobrancaResult<Vec<u8>> {
    fs::read(path).map_err(|e| CobrancaError::IoReader {
        source: e,
        arquivo: path.to_path_buf(),
    })
}

/// Cadastro inexistente equivale a um cadastro vazio.
fn carregar_cadastro(path: &Path) -> CobrancaResult<MemoriaBoletos> {
    if path.exists() {
        MemoriaBoletos::carregar_csv(path)
    } else {
        warn!("cadastro {path:?} inexistente: iniciando vazio");
        Ok(MemoriaBoletos::new())
    }
}

/// Avança a sequência configurada para além do maior nosso número já emitido.
pub fn ajustar_sequencia(config: &ConfigCobranca, repo: &MemoriaBoletos) -> ConfigCobranca {
    let mut ajustada = config.clone();

    if let PoliticaNossoNumero::Sequencial { proximo } = &mut ajustada.identificador {
        let maior = repo
            .boletos()
            .iter()
            .filter_map(|b| b.nosso_numero.parse::<u64>().ok())
            .max()
            .unwrap_or_default();

        *proximo = (*proximo).max(maior + 1);
    }

    ajustada
}

fn comando_gerar(
    plano: &PlanoParcelas,
    config: &ConfigCobranca,
    cadastro: &Path,
) -> CobrancaResult<()> {
    let mut repo = carregar_cadastro(cadastro)?;
    let config = ajustar_sequencia(config, &repo);
    let mut gerador = GeradorBoletos::new(&config)?;

    let boletos = gerar_parcelas(plano)?
        .into_iter()
        .map(|novo| gerador.gerar_boleto(novo, &mut repo))
        .collect::<CobrancaResult<Vec<_>>>()?;

    repo.salvar_csv(cadastro)?;
    info!(
        "{} boletos gerados para o contrato {}",
        boletos.len(),
        plano.contrato_id
    );

    imprimir_boletos(&boletos, Local::now().date_naive());
    Ok(())
}

fn comando_remessa(
    ids: &[String],
    sequencial: u32,
    saida: &Path,
    config: &ConfigCobranca,
    cadastro: &Path,
) -> CobrancaResult<()> {
    let repo = MemoriaBoletos::carregar_csv(cadastro)?;
    let boletos = repo.listar_elegiveis_para_remessa(ids)?;

    let lote = ParametrosLote {
        sequencial,
        gerado_em: Local::now().naive_local(),
    };
    let remessa = codificar_remessa(&boletos, config, lote)?;

    let destino = saida.join(&remessa.nome_arquivo);
    fs::write(&destino, &remessa.conteudo)?;

    imprimir_resumo_remessa(&remessa, &config.banco.codigo_banco);
    println!(" ---> Arquivo gravado: <{}>\n", destino.display());

    Ok(())
}

fn inspecionar_remessa(path: &Path, config: &ConfigCobranca) -> CobrancaResult<()> {
    let remessa = ler_remessa(&ler_arquivo(path)?, config)?;

    let nome = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if !REGEX_ARQUIVO_REMESSA.is_match(nome) {
        warn!("nome <{nome}> fora do padrão REMAAAAMMDDHHmmss.rem");
    }

    println!(" --- Remessa {} ---", path.display());
    println!(
        " Banco: {} ({}) | Sequencial: {} | Gravação: {}",
        remessa.codigo_banco,
        get_nome_do_banco(&remessa.codigo_banco),
        remessa.sequencial,
        remessa
            .data_gravacao
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default()
    );

    for titulo in &remessa.titulos {
        println!(
            " {} | {} | {:>14} | {}",
            titulo.nosso_numero,
            titulo.data_vencimento.format("%d/%m/%Y"),
            fmt_valor(titulo.valor),
            titulo.nome_pagador
        );
    }

    println!(
        "\n Títulos: {} | Registros: {} | Valor total: R$ {}\n",
        fmt_milhares(remessa.titulos.len()),
        fmt_milhares(remessa.quantidade_registros),
        fmt_valor(remessa.valor_total)
    );

    Ok(())
}

fn inspecionar_codigo(codigo: &str) -> CobrancaResult<()> {
    let digitos = somente_digitos(codigo);

    let (codigo_barras, linha) = match digitos.len() {
        47 => (validar_linha_digitavel(&digitos)?, digitos.to_string()),
        44 => {
            validar_codigo_barras(&digitos)?;
            (digitos.to_string(), gerar_linha_digitavel(&digitos)?)
        }
        n => {
            return Err(CobrancaError::Validation(format!(
                "esperados 44 ou 47 dígitos, encontrados {n}"
            )));
        }
    };

    let banco = &codigo_barras[0..3];
    let fator: i64 = codigo_barras[5..9].parse().unwrap_or_default();
    let centavos: u64 = codigo_barras[9..19].parse().unwrap_or_default();
    let vencimento = (fator > 0).then(|| DATA_BASE_FATOR + TimeDelta::days(fator));

    println!(" Banco: {banco} ({})", get_nome_do_banco(banco));
    println!(" Código de barras: {codigo_barras}");
    println!(" Linha digitável: {}", formatar_linha_digitavel(&linha)?);
    println!(" Valor: R$ {}", fmt_valor(centavos_em_valor(centavos)));
    if let Some(vencimento) = vencimento {
        // O fator reinicia em 1000 a cada 9000 dias; exibe o primeiro ciclo.
        println!(" Vencimento (fator {fator}): {}", vencimento.format("%d/%m/%Y"));
    }
    println!(" Dígitos verificadores conferidos.\n");

    Ok(())
}

fn comando_simular(
    remessa: &Path,
    pagos: &[String],
    cancelados: &[String],
    data: NaiveDate,
    protocolo: u32,
    saida: &Path,
    config: &ConfigCobranca,
) -> CobrancaResult<()> {
    let lida = ler_remessa(&ler_arquivo(remessa)?, config)?;

    let instrucoes = pagos
        .iter()
        .map(|nn| (nn, StatusRetorno::Pago))
        .chain(cancelados.iter().map(|nn| (nn, StatusRetorno::Cancelado)));

    let ocorrencias = instrucoes
        .map(|(nosso_numero, status)| -> CobrancaResult<OcorrenciaSimulada> {
            let titulo = lida
                .titulos
                .iter()
                .find(|t| &t.nosso_numero == nosso_numero)
                .ok_or_else(|| {
                    CobrancaError::Validation(format!(
                        "nosso número {nosso_numero} não consta da remessa"
                    ))
                })?;

            let valor_pago = (status == StatusRetorno::Pago).then_some(titulo.valor);

            Ok(OcorrenciaSimulada {
                nosso_numero: titulo.nosso_numero.clone(),
                numero_documento: titulo.numero_documento.clone(),
                status,
                data_ocorrencia: data,
                data_vencimento: Some(titulo.data_vencimento),
                valor_titulo: titulo.valor,
                valor_pago,
            })
        })
        .collect::<CobrancaResult<Vec<_>>>()?;

    let conteudo = codificar_retorno(&ocorrencias, protocolo, data, config)?;
    fs::write(saida, conteudo)?;

    println!(
        " ---> Retorno simulado com {} ocorrência(s): <{}>\n",
        ocorrencias.len(),
        saida.display()
    );

    Ok(())
}

fn comando_retorno(arquivos: &[PathBuf], config: &ConfigCobranca) -> CobrancaResult<()> {
    let conteudos = arquivos
        .iter()
        .map(|path| ler_arquivo(path))
        .collect::<CobrancaResult<Vec<_>>>()?;

    for (path, resultado) in arquivos.iter().zip(decodificar_lotes(&conteudos, config)) {
        println!(" --- Retorno {} ---", path.display());

        let decodificado = match resultado {
            Ok(decodificado) => decodificado,
            Err(e) => {
                println!(" Arquivo rejeitado: {e}\n");
                continue;
            }
        };

        let lote = &decodificado.lote;
        println!(
            " Protocolo: {} | Registros: {} | Linhas: {}",
            lote.protocolo,
            fmt_milhares(lote.registros.len()),
            fmt_milhares(lote.total_linhas)
        );

        for registro in &lote.registros {
            println!(
                " {} | {} {:<45} | {} | {:>14}",
                registro.nosso_numero,
                registro.codigo_ocorrencia,
                get_descricao_ocorrencia(&registro.codigo_ocorrencia),
                registro.data_ocorrencia.format("%d/%m/%Y"),
                registro.valor_pago.map(fmt_valor).unwrap_or_default()
            );
        }

        for erro in &decodificado.erros {
            println!("  -> {erro}");
        }
        println!();
    }

    Ok(())
}

fn comando_conciliar(
    arquivo: &Path,
    relatorio: Option<&Path>,
    config: &ConfigCobranca,
    cadastro: &Path,
) -> CobrancaResult<()> {
    let mut repo = MemoriaBoletos::carregar_csv(cadastro)?;
    let conteudo = ler_arquivo(arquivo)?;

    let resultado = processar_retorno(&conteudo, config, &mut repo);
    imprimir_relatorio_retorno(&resultado);

    if let SituacaoProcessamento::Rejeitado(motivo) = &resultado.situacao {
        return Err(CobrancaError::Validation(motivo.clone()));
    }

    repo.salvar_csv(cadastro)?;

    if let Some(path) = relatorio {
        exportar_conciliacao(&resultado.conciliacao, path)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{boleto_de_teste, config_de_teste};
    use rust_decimal::Decimal;

    #[test]
    fn sequencia_avanca_alem_do_cadastro() {
        let vencimento = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let repo = MemoriaBoletos::com_boletos([
            boleto_de_teste("00000000041", Decimal::ONE, vencimento),
            boleto_de_teste("00000000007", Decimal::ONE, vencimento),
        ])
        .unwrap();

        let config = ajustar_sequencia(&config_de_teste(), &repo);
        assert_eq!(
            config.identificador,
            PoliticaNossoNumero::Sequencial { proximo: 42 }
        );

        let vazio = ajustar_sequencia(&config_de_teste(), &MemoriaBoletos::new());
        assert_eq!(
            vazio.identificador,
            PoliticaNossoNumero::Sequencial { proximo: 1 }
        );
    }

    #[test]
    fn codigo_com_tamanho_invalido_e_recusado() {
        assert!(matches!(
            inspecionar_codigo("1234"),
            Err(CobrancaError::Validation(_))
        ));
    }
}
