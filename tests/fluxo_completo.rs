// Fluxo completo: geração dos boletos, remessa, retorno simulado e conciliação.

use chrono::{NaiveDate, NaiveDateTime};
use cobranca_cnab::*;
use rust_decimal::Decimal;

fn data(a: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(a, m, d).unwrap()
}

fn config() -> ConfigCobranca {
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

fn novo(parcela: u32, valor: Decimal, vencimento: NaiveDate) -> NovoBoleto {
    NovoBoleto {
        id: Some(format!("boleto-{parcela}")),
        cliente_id: "cliente-9".into(),
        contrato_id: "contrato-9".into(),
        valor,
        data_vencimento: vencimento,
        numero_parcela: parcela,
        descricao: format!("Lote 7 - parcela {parcela}/3"),
        nome_pagador: "Ana Luíza Fagundes".into(),
        documento_pagador: "529.982.247-25".into(),
        data_geracao: data(2023, 12, 20),
    }
}

/// Três boletos gerados: R$ 100 (10/01), R$ 250 (15/01) e R$ 75 (20/01).
fn cenario(config: &ConfigCobranca) -> (MemoriaBoletos, Vec<Boleto>) {
    let mut repo = MemoriaBoletos::new();
    let mut gerador = GeradorBoletos::new(config).unwrap();

    let boletos = [
        novo(1, Decimal::new(100, 0), data(2024, 1, 10)),
        novo(2, Decimal::new(250, 0), data(2024, 1, 15)),
        novo(3, Decimal::new(75, 0), data(2024, 1, 20)),
    ]
    .into_iter()
    .map(|n| gerador.gerar_boleto(n, &mut repo).unwrap())
    .collect();

    (repo, boletos)
}

fn lote_remessa() -> ParametrosLote {
    ParametrosLote {
        sequencial: 1,
        gerado_em: NaiveDateTime::parse_from_str("2024-01-05 09:30:00", "%Y-%m-%d %H:%M:%S")
            .unwrap(),
    }
}

fn ocorrencia(titulo: &TituloRemessa, status: StatusRetorno) -> OcorrenciaSimulada {
    OcorrenciaSimulada {
        nosso_numero: titulo.nosso_numero.clone(),
        numero_documento: titulo.numero_documento.clone(),
        valor_pago: (status == StatusRetorno::Pago).then_some(titulo.valor),
        status,
        data_ocorrencia: data(2024, 1, 12),
        data_vencimento: Some(titulo.data_vencimento),
        valor_titulo: titulo.valor,
    }
}

#[test]
fn boletos_gerados_tem_identificadores_validos() {
    let config = config();
    let (_, boletos) = cenario(&config);

    let nossos_numeros: Vec<&str> = boletos.iter().map(|b| b.nosso_numero.as_str()).collect();
    assert_eq!(nossos_numeros, ["00000000001", "00000000002", "00000000003"]);

    for boleto in &boletos {
        assert_eq!(boleto.status, StatusBoleto::Gerado);
        assert_eq!(boleto.documento_pagador, "52998224725");
        assert_eq!(validar_linha_digitavel(&boleto.linha_digitavel).unwrap(), boleto.codigo_barras);
    }

    assert_eq!(
        boletos[0].codigo_barras,
        "23791959100000100001234567000000000011090001"
    );
}

#[test]
fn remessa_relida_recupera_identificadores_e_valores() {
    let config = config();
    let (_, boletos) = cenario(&config);

    let remessa = codificar_remessa(&boletos, &config, lote_remessa()).unwrap();
    assert_eq!(remessa.quantidade_registros, 5);
    assert_eq!(remessa.valor_total, Decimal::new(425, 0));

    let lida = ler_remessa(&remessa.conteudo, &config).unwrap();
    let recuperados: Vec<(String, Decimal)> = lida
        .titulos
        .iter()
        .map(|t| (t.nosso_numero.clone(), t.valor))
        .collect();
    let originais: Vec<(String, Decimal)> = boletos
        .iter()
        .map(|b| (b.nosso_numero.clone(), b.valor))
        .collect();

    assert_eq!(recuperados, originais);
}

#[test]
fn retorno_com_pago_e_cancelado_atualiza_dois_boletos() {
    let config = config();
    let (mut repo, boletos) = cenario(&config);

    let remessa = codificar_remessa(&boletos, &config, lote_remessa()).unwrap();
    let lida = ler_remessa(&remessa.conteudo, &config).unwrap();

    // Terceiro título ausente do retorno.
    let retorno = codificar_retorno(
        &[
            ocorrencia(&lida.titulos[0], StatusRetorno::Pago),
            ocorrencia(&lida.titulos[1], StatusRetorno::Cancelado),
        ],
        1,
        data(2024, 1, 13),
        &config,
    )
    .unwrap();

    let decodificado = decodificar_retorno(&retorno, &config).unwrap();
    assert!(decodificado.sem_erros());

    let resultado = conciliar(&decodificado.lote, &mut repo);
    assert_eq!(resultado.sucesso.len(), 2);
    assert!(resultado.falha.is_empty());

    let primeiro = repo.buscar_por_id("boleto-1").unwrap();
    assert_eq!(primeiro.status, StatusBoleto::Pago);
    assert_eq!(primeiro.data_pagamento, Some(data(2024, 1, 12)));
    assert_eq!(primeiro.valor_pago, Some(Decimal::new(100, 0)));

    let segundo = repo.buscar_por_id("boleto-2").unwrap();
    assert_eq!(segundo.status, StatusBoleto::Cancelado);

    assert_eq!(repo.buscar_por_id("boleto-3").unwrap(), &boletos[2]);
}

#[test]
fn nosso_numero_inexistente_gera_falha() {
    let config = config();
    let (mut repo, _) = cenario(&config);

    let retorno = codificar_retorno(
        &[OcorrenciaSimulada {
            nosso_numero: "00000000999".into(),
            numero_documento: String::new(),
            status: StatusRetorno::Pago,
            data_ocorrencia: data(2024, 1, 12),
            data_vencimento: None,
            valor_titulo: Decimal::new(50, 0),
            valor_pago: Some(Decimal::new(50, 0)),
        }],
        2,
        data(2024, 1, 13),
        &config,
    )
    .unwrap();

    let lote = decodificar_retorno(&retorno, &config).unwrap().lote;
    let resultado = conciliar(&lote, &mut repo);

    assert!(resultado.sucesso.is_empty());
    assert_eq!(resultado.falha.len(), 1);
    assert_eq!(resultado.falha[0].erro, MotivoFalha::BoletoNotFound);
    assert_eq!(resultado.falha[0].erro.to_string(), "BoletoNotFound");
}

#[test]
fn remessa_com_boleto_pago_e_rejeitada_por_inteiro() {
    let config = config();
    let (_, mut boletos) = cenario(&config);

    boletos[1].status = StatusBoleto::Pago;

    let erro = codificar_remessa(&boletos, &config, lote_remessa()).unwrap_err();
    assert!(matches!(erro, CobrancaError::Validation(_)));
}

#[test]
fn processar_duas_vezes_nao_duplica_baixas() {
    let config = config();
    let (mut repo, boletos) = cenario(&config);

    let remessa = codificar_remessa(&boletos, &config, lote_remessa()).unwrap();
    let lida = ler_remessa(&remessa.conteudo, &config).unwrap();
    let retorno = codificar_retorno(
        &[
            ocorrencia(&lida.titulos[0], StatusRetorno::Pago),
            ocorrencia(&lida.titulos[2], StatusRetorno::Pago),
        ],
        3,
        data(2024, 1, 13),
        &config,
    )
    .unwrap();

    let primeiro = processar_retorno(&retorno, &config, &mut repo);
    assert_eq!(primeiro.situacao, SituacaoProcessamento::ProcessadoComSucesso);
    assert_eq!(primeiro.parcelas_pagas.get("contrato-9"), Some(&2));

    let estado = repo.boletos().to_vec();
    let segundo = processar_retorno(&retorno, &config, &mut repo);

    assert_eq!(segundo.situacao, SituacaoProcessamento::ProcessadoComSucesso);
    assert!(segundo.conciliacao.sucesso.is_empty());
    assert_eq!(
        segundo.conciliacao.ja_aplicados,
        vec!["00000000001".to_string(), "00000000003".to_string()]
    );
    assert_eq!(repo.boletos(), estado.as_slice());
    assert_eq!(repo.parcelas_pagas("contrato-9").unwrap(), 2);
}

#[test]
fn trailer_divergente_mantem_registros_lidos() {
    let config = config();
    let (_, boletos) = cenario(&config);

    let ocorrencias: Vec<OcorrenciaSimulada> = boletos
        .iter()
        .map(|b| OcorrenciaSimulada {
            nosso_numero: b.nosso_numero.clone(),
            numero_documento: String::new(),
            status: StatusRetorno::Vencido,
            data_ocorrencia: data(2024, 1, 25),
            data_vencimento: Some(b.data_vencimento),
            valor_titulo: b.valor,
            valor_pago: None,
        })
        .collect();

    let retorno = codificar_retorno(&ocorrencias, 4, data(2024, 1, 26), &config).unwrap();

    // Descarta a última linha de detalhe (cada linha tem 400 + CRLF).
    let largura = 402;
    let mut adulterado = retorno[..3 * largura].to_vec();
    adulterado.extend_from_slice(&retorno[4 * largura..]);

    let relatorio = processar_retorno(&adulterado, &config, &mut MemoriaBoletos::new());
    assert_eq!(relatorio.situacao, SituacaoProcessamento::ProcessadoComErros);

    let decodificado = decodificar_retorno(&adulterado, &config).unwrap();
    assert_eq!(decodificado.lote.registros.len(), 2);
    assert!(decodificado.erros.iter().any(|e| matches!(
        e,
        CobrancaError::ControlTotalMismatch {
            campo: "quantidade_titulos",
            ..
        }
    )));
}

#[test]
fn cadastro_csv_preserva_boletos() {
    let config = config();
    let (repo, boletos) = cenario(&config);

    let path = std::env::temp_dir().join(format!("boletos-{}.csv", uuid::Uuid::new_v4()));
    repo.salvar_csv(&path).unwrap();
    let recarregado = MemoriaBoletos::carregar_csv(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(recarregado.boletos(), boletos.as_slice());
    assert_eq!(
        recarregado
            .buscar_por_nosso_numero("00000000002")
            .unwrap()
            .map(|b| b.valor),
        Some(Decimal::new(250, 0))
    );
}

#[test]
fn configuracao_de_exemplo_e_valida() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("cobranca.toml");
    let carregada = ConfigCobranca::carregar(&path).unwrap();

    assert_eq!(carregada.banco.codigo_banco, "237");
    assert_eq!(carregada.arquivo.formato_data, FormatoData::Ddmmaa);
    assert_eq!(
        carregada.identificador,
        PoliticaNossoNumero::Sequencial { proximo: 1 }
    );
}
