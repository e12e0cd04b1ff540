// Propriedades dos identificadores e da conciliação para entradas arbitrárias.

use chrono::{Days, NaiveDate};
use cobranca_cnab::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn banco(codigo_banco: u16, convenio: u32, carteira: u16, agencia: u16) -> ConfigBanco {
    ConfigBanco {
        codigo_banco: format!("{codigo_banco:03}"),
        codigo_convenio: convenio.to_string(),
        carteira: carteira.to_string(),
        agencia: agencia.to_string(),
        ..Default::default()
    }
}

fn vencimento(dias: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.checked_add_days(Days::new(dias)))
        .unwrap()
}

fn status_retorno() -> impl Strategy<Value = StatusRetorno> {
    prop_oneof![
        Just(StatusRetorno::Pago),
        Just(StatusRetorno::Cancelado),
        Just(StatusRetorno::Vencido),
    ]
}

fn registro(nosso_numero: &str, status: StatusRetorno, dia: u32) -> RegistroRetorno {
    let ocorrencia = NaiveDate::from_ymd_opt(2024, 2, dia).unwrap();
    RegistroRetorno {
        linha: 2,
        nosso_numero: nosso_numero.into(),
        numero_documento: String::new(),
        codigo_ocorrencia: String::new(),
        data_pagamento: (status == StatusRetorno::Pago).then_some(ocorrencia),
        status,
        data_ocorrencia: ocorrencia,
        data_vencimento: None,
        valor_titulo: Decimal::new(100, 0),
        valor_pago: None,
    }
}

fn lote(registros: Vec<RegistroRetorno>) -> LoteRetorno {
    LoteRetorno {
        protocolo: 1,
        codigo_banco: "001".into(),
        codigo_convenio: "1".into(),
        data_processamento: None,
        registros,
        total_linhas: 0,
        impressao_digital: String::new(),
    }
}

fn repositorio(quantidade: usize) -> MemoriaBoletos {
    let config = ConfigCobranca {
        banco: banco(1, 1234567, 17, 3210),
        ..Default::default()
    };
    let mut repo = MemoriaBoletos::new();
    let mut gerador = GeradorBoletos::new(&config).unwrap();

    for parcela in 1..=quantidade as u32 {
        let novo = NovoBoleto {
            id: None,
            cliente_id: "c".into(),
            contrato_id: "k".into(),
            valor: Decimal::new(100, 0),
            data_vencimento: vencimento(9000),
            numero_parcela: parcela,
            descricao: String::new(),
            nome_pagador: "Pagador".into(),
            documento_pagador: "11222333000181".into(),
            data_geracao: vencimento(8900),
        };
        gerador.gerar_boleto(novo, &mut repo).unwrap();
    }

    repo
}

fn nosso_numero(i: usize) -> String {
    format!("{:011}", i + 1)
}

proptest! {
    /// Código de barras com 44 dígitos e DV geral válido; linha com 47 dígitos
    /// cujos DVs de campo conferem e que reconstrói o mesmo código.
    #[test]
    fn identificadores_sao_autoconsistentes(
        codigo_banco in 1u16..=999,
        convenio in 1u32..=9_999_999,
        carteira in 1u16..=999,
        agencia in 1u16..=9999,
        nn in 1u64..=99_999_999_999,
        dias in 0u64..20_000,
        centavos in 1i64..=9_999_999_999,
    ) {
        let banco = banco(codigo_banco, convenio, carteira, agencia);
        let nn = format!("{nn:011}");
        let valor = Decimal::new(centavos, 2);

        let codigo = gerar_codigo_barras(&banco, &nn, vencimento(dias), valor).unwrap();
        prop_assert_eq!(codigo.len(), 44);
        prop_assert!(codigo.bytes().all(|b| b.is_ascii_digit()));
        prop_assert!(validar_codigo_barras(&codigo).is_ok());

        let linha = gerar_linha_digitavel(&codigo).unwrap();
        prop_assert_eq!(linha.len(), 47);
        for (campo, dv) in [(0..9, 9), (10..20, 20), (21..31, 31)] {
            prop_assert_eq!(modulo10(&linha[campo]).unwrap(), linha.as_bytes()[dv] - b'0');
        }
        prop_assert_eq!(validar_linha_digitavel(&linha).unwrap(), codigo);
    }

    /// Troca de um dígito nos campos 1 a 3 é sempre detectada pelo módulo 10.
    #[test]
    fn digito_alterado_nos_campos_e_detectado(
        nn in 1u64..=99_999_999_999,
        posicao in 0usize..31,
        incremento in 1u8..=9,
    ) {
        let banco = banco(237, 1234567, 109, 1);
        let codigo = gerar_codigo_barras(&banco, &format!("{nn:011}"), vencimento(9000), Decimal::ONE).unwrap();
        let linha = gerar_linha_digitavel(&codigo).unwrap();

        let mut bytes = linha.into_bytes();
        bytes[posicao] = b'0' + (bytes[posicao] - b'0' + incremento) % 10;
        let adulterada = String::from_utf8(bytes).unwrap();

        prop_assert!(validar_linha_digitavel(&adulterada).is_err());
    }

    /// O fator de vencimento sempre cabe em 4 dígitos.
    #[test]
    fn fator_cabe_em_quatro_digitos(dias in 0u64..60_000) {
        let fator = fator_vencimento(vencimento(dias)).unwrap();
        prop_assert!(fator <= 9999);
    }

    /// Reconciliar duas vezes produz o mesmo estado e nenhuma nova atualização.
    #[test]
    fn conciliacao_e_idempotente(
        instrucoes in prop::collection::vec((0usize..5, status_retorno(), 1u32..=28), 0..12),
    ) {
        let mut repo = repositorio(5);
        let lote = lote(
            instrucoes
                .iter()
                .map(|(i, status, dia)| registro(&nosso_numero(*i), status.clone(), *dia))
                .collect(),
        );

        conciliar(&lote, &mut repo);
        let estado = repo.boletos().to_vec();
        let atualizacoes = repo.total_de_atualizacoes();
        let pagas = repo.parcelas_pagas("k").unwrap();

        let segundo = conciliar(&lote, &mut repo);

        prop_assert!(segundo.sucesso.is_empty());
        prop_assert_eq!(repo.boletos(), estado.as_slice());
        prop_assert_eq!(repo.total_de_atualizacoes(), atualizacoes);
        prop_assert_eq!(repo.parcelas_pagas("k").unwrap(), pagas);
    }

    /// Boletos pagos ou cancelados nunca saem desses estados pela conciliação.
    #[test]
    fn estados_terminais_sao_definitivos(
        sequencia in prop::collection::vec((status_retorno(), 1u32..=28), 1..10),
    ) {
        let mut repo = repositorio(1);
        let mut terminal: Option<Boleto> = None;

        for (status, dia) in sequencia {
            conciliar(&lote(vec![registro(&nosso_numero(0), status, dia)]), &mut repo);
            let atual = repo.boletos()[0].clone();

            if let Some(anterior) = &terminal {
                prop_assert_eq!(&atual, anterior);
            } else if atual.status.eh_terminal() {
                terminal = Some(atual);
            }
        }
    }
}
