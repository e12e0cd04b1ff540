use std::collections::HashMap;
use std::sync::LazyLock;

// --- Tabelas de Referência ---

/// Nome abreviado da instituição pelo código de compensação (COMPE).
pub fn get_nome_do_banco(codigo: &str) -> &'static str {
    match codigo {
        "001" => "Banco do Brasil",
        "033" => "Santander",
        "041" => "Banrisul",
        "070" => "BRB",
        "077" => "Banco Inter",
        "104" => "Caixa Econômica Federal",
        "136" => "Unicred",
        "237" => "Bradesco",
        "260" => "Nu Pagamentos",
        "336" => "C6 Bank",
        "341" => "Itaú Unibanco",
        "422" => "Safra",
        "748" => "Sicredi",
        "756" => "Sicoob",
        _ => "Banco Desconhecido",
    }
}

/// Descrição dos códigos de ocorrência mais comuns do retorno CNAB 400.
/// A classificação em pago/cancelado/vencido vem da configuração; esta
/// tabela serve apenas para exibição.
pub fn get_descricao_ocorrencia(codigo: &str) -> &'static str {
    match codigo {
        "02" => "Entrada Confirmada",
        "03" => "Entrada Rejeitada",
        "06" => "Liquidação Normal",
        "07" => "Liquidação por Conta",
        "08" => "Liquidação por Saldo",
        "09" => "Baixado Automaticamente via Arquivo",
        "10" => "Baixado conforme Instruções da Agência",
        "12" => "Abatimento Concedido",
        "13" => "Abatimento Cancelado",
        "14" => "Vencimento Alterado",
        "15" => "Liquidação em Cartório",
        "17" => "Liquidação após Baixa ou Título não Registrado",
        "19" => "Confirmação de Recebimento de Instrução de Protesto",
        "23" => "Entrada do Título em Cartório",
        "28" => "Débito de Tarifas/Custas",
        _ => "Ocorrência Desconhecida",
    }
}

// Cabeçalhos das colunas do relatório de conciliação (CSV)
pub static COLUNAS_CONCILIACAO: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        HashMap::from([
            ("nosso_numero", "Nosso Número"),
            ("linha", "Nº da Linha do Retorno"),
            ("resultado", "Resultado da Conciliação"),
            ("status", "Novo Status do Boleto"),
            ("motivo", "Motivo da Falha"),
        ])
    });

// Cabeçalhos das colunas da listagem de boletos
pub static COLUNAS_BOLETO: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("nosso_numero", "Nosso Número"),
        ("parcela", "Parcela"),
        ("vencimento", "Vencimento"),
        ("valor", "Valor (R$)"),
        ("status", "Situação"),
        ("linha_digitavel", "Linha Digitável"),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabelas_conhecem_codigos_padrao() {
        assert_eq!(get_nome_do_banco("237"), "Bradesco");
        assert_eq!(get_nome_do_banco("999"), "Banco Desconhecido");
        assert_eq!(get_descricao_ocorrencia("06"), "Liquidação Normal");
        assert_eq!(COLUNAS_CONCILIACAO["motivo"], "Motivo da Falha");
    }
}
