use chrono::NaiveDate;
use csv::WriterBuilder;
use rust_decimal::Decimal;
use std::{collections::BTreeMap, path::Path};

use crate::{
    ArquivoRemessa, Boleto, COLUNAS_BOLETO, COLUNAS_CONCILIACAO, CobrancaResult,
    RelatorioProcessamento, ResultadoConciliacao, SituacaoProcessamento, StatusBoleto,
    get_nome_do_banco,
};

pub fn fmt_milhares(n: usize) -> String {
    let s = n.to_string();
    let len = s.len();
    let mut result = String::with_capacity(len + len / 3);

    s.chars().enumerate().for_each(|(i, c)| {
        if i > 0 && (len - i).is_multiple_of(3) {
            result.push('.');
        }
        result.push(c);
    });

    result
}

/// Valor monetário no formato brasileiro: 1.234,56
pub fn fmt_valor(valor: Decimal) -> String {
    let texto = format!("{:.2}", valor.abs());
    let (inteiro, centavos) = texto.split_once('.').unwrap_or((texto.as_str(), "00"));
    let inteiro = inteiro
        .parse::<usize>()
        .map(fmt_milhares)
        .unwrap_or_else(|_| inteiro.to_string());
    let sinal = if valor.is_sign_negative() && !valor.is_zero() { "-" } else { "" };

    format!("{sinal}{inteiro},{centavos}")
}

pub fn imprimir_boletos(boletos: &[Boleto], hoje: NaiveDate) {
    let col = |nome: &str| COLUNAS_BOLETO.get(nome).copied().unwrap_or_default();

    println!(
        " {:<11} | {:>7} | {:<10} | {:>14} | {:<9} | {}",
        col("nosso_numero"),
        col("parcela"),
        col("vencimento"),
        col("valor"),
        col("status"),
        col("linha_digitavel"),
    );

    for boleto in boletos {
        println!(
            " {:<11} | {:>7} | {:<10} | {:>14} | {:<9} | {}",
            boleto.nosso_numero,
            boleto.numero_parcela,
            boleto.data_vencimento.format("%d/%m/%Y"),
            fmt_valor(boleto.valor),
            boleto.status_em(hoje),
            boleto.linha_digitavel
        );
    }

    let total: Decimal = boletos.iter().map(|b| b.valor).sum();
    println!(
        "\n Boletos: {} | Valor total: R$ {}\n",
        fmt_milhares(boletos.len()),
        fmt_valor(total)
    );
}

pub fn imprimir_resumo_remessa(remessa: &ArquivoRemessa, codigo_banco: &str) {
    println!(" --- Arquivo de Remessa: {} ---", remessa.nome_arquivo);
    println!(" Banco: {} ({})", codigo_banco, get_nome_do_banco(codigo_banco));
    println!(" Sequencial do arquivo: {}", remessa.sequencial);
    println!(
        " Títulos: {} | Registros: {} | Valor total: R$ {}",
        fmt_milhares(remessa.quantidade_titulos),
        fmt_milhares(remessa.quantidade_registros),
        fmt_valor(remessa.valor_total)
    );
    println!(" Impressão digital (blake3): {}\n", remessa.impressao_digital);
}

pub fn imprimir_relatorio_retorno(relatorio: &RelatorioProcessamento) {
    let situacao = match &relatorio.situacao {
        SituacaoProcessamento::ProcessadoComSucesso => "processado com sucesso".to_string(),
        SituacaoProcessamento::ProcessadoComErros => "processado com erros".to_string(),
        SituacaoProcessamento::Rejeitado(motivo) => format!("rejeitado: {motivo}"),
    };

    println!(" --- Processamento do Retorno ---");
    if let Some(protocolo) = relatorio.protocolo {
        println!(" Protocolo: {protocolo}");
    }
    println!(" Situação: {situacao}");

    let conciliacao = &relatorio.conciliacao;
    let resumo: BTreeMap<StatusBoleto, usize> =
        conciliacao
            .sucesso
            .iter()
            .fold(BTreeMap::new(), |mut acc, s| {
                *acc.entry(s.novo_status).or_insert(0) += 1;
                acc
            });

    for (status, qtd) in &resumo {
        println!(" Boletos atualizados para {status:<9} = {:>7}", fmt_milhares(*qtd));
    }
    println!(
        " Já aplicados = {:>7} | Falhas = {:>7} | Erros de leitura = {:>7}",
        fmt_milhares(conciliacao.ja_aplicados.len()),
        fmt_milhares(conciliacao.falha.len()),
        fmt_milhares(relatorio.erros_leitura.len())
    );

    for erro in &relatorio.erros_leitura {
        println!("  -> {erro}");
    }
    for falha in &conciliacao.falha {
        println!(
            "  -> linha {}: nosso número {}: {}",
            falha.linha, falha.nosso_numero, falha.erro
        );
    }
    for (contrato, pagas) in &relatorio.parcelas_pagas {
        println!(" Contrato {contrato}: {pagas} parcela(s) paga(s)");
    }
    println!();
}

/// Linhas do relatório de conciliação, na ordem: sucessos, já aplicados, falhas.
pub fn linhas_conciliacao(resultado: &ResultadoConciliacao) -> Vec<[String; 5]> {
    let sucessos = resultado.sucesso.iter().map(|s| {
        [
            s.nosso_numero.clone(),
            String::new(),
            "sucesso".to_string(),
            s.novo_status.to_string(),
            String::new(),
        ]
    });

    let ja_aplicados = resultado.ja_aplicados.iter().map(|nn| {
        [
            nn.clone(),
            String::new(),
            "ja_aplicado".to_string(),
            String::new(),
            String::new(),
        ]
    });

    let falhas = resultado.falha.iter().map(|f| {
        [
            f.nosso_numero.clone(),
            f.linha.to_string(),
            "falha".to_string(),
            String::new(),
            f.erro.to_string(),
        ]
    });

    sucessos.chain(ja_aplicados).chain(falhas).collect()
}

/// Grava o resultado da conciliação em CSV delimitado por ';'.
pub fn exportar_conciliacao(resultado: &ResultadoConciliacao, path: &Path) -> CobrancaResult<()> {
    let mut writer = WriterBuilder::new().delimiter(b';').from_path(path)?;

    let cabecalho = ["nosso_numero", "linha", "resultado", "status", "motivo"]
        .map(|nome| COLUNAS_CONCILIACAO.get(nome).copied().unwrap_or(nome));
    writer.write_record(cabecalho)?;

    for linha in linhas_conciliacao(resultado) {
        writer.write_record(&linha)?;
    }

    writer.flush()?;
    println!(" ---> Relatório de conciliação: <{}>", path.display());

    Ok(())
}
