use chrono::NaiveDate;
use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{CobrancaError, CobrancaResult};

/// Data base do fator de vencimento (FEBRABAN).
pub const DATA_BASE_FATOR: NaiveDate = match NaiveDate::from_ymd_opt(1997, 10, 7) {
    Some(data) => data,
    None => panic!("data base inválida"),
};

/// Maior valor representável no código de barras: 10 dígitos de centavos.
pub const VALOR_MAXIMO_CENTAVOS: u64 = 9_999_999_999;

/// Dígito verificador módulo 10 (campos da linha digitável).
///
/// Pesos 2 e 1 alternados a partir do dígito mais à direita.
/// Produtos maiores que 9 têm seus algarismos somados.
///
/// ### Exemplo
/// ```
/// use cobranca_cnab::modulo10;
///
/// assert_eq!(modulo10("237912345").unwrap(), 4);
/// assert!(modulo10("2379-2345").is_err());
/// ```
pub fn modulo10(numero: &str) -> CobrancaResult<u8> {
    let soma: u32 = algarismos(numero)?
        .rev()
        .zip([2u32, 1].into_iter().cycle())
        .map(|(d, peso)| {
            let produto = d * peso;
            produto / 10 + produto % 10
        })
        .sum();

    Ok(((10 - soma % 10) % 10) as u8)
}

/// Dígito verificador geral do código de barras (módulo 11).
///
/// Pesos de 2 a 9, reiniciados a cada ciclo, a partir da direita.
/// Restos que resultariam em 0, 10 ou 11 produzem o dígito 1.
pub fn modulo11(numero: &str) -> CobrancaResult<u8> {
    let soma: u32 = algarismos(numero)?
        .rev()
        .zip((2u32..=9).cycle())
        .map(|(d, peso)| d * peso)
        .sum();

    Ok(match 11 - soma % 11 {
        0 | 10 | 11 => 1,
        dv => dv as u8,
    })
}

/// Algarismos de um número em texto, rejeitando qualquer outro caractere.
fn algarismos(numero: &str) -> CobrancaResult<impl DoubleEndedIterator<Item = u32> + '_> {
    if !apenas_digitos(numero) {
        return Err(CobrancaError::Validation(format!(
            "cálculo de dígito verificador exige apenas dígitos: <{numero}>"
        )));
    }

    Ok(numero.bytes().map(|b| u32::from(b - b'0')))
}

/// Fator de vencimento: dias desde 07/10/1997.
///
/// A partir de 22/02/2025 o fator ultrapassaria 9999 e reinicia em 1000,
/// conforme a regra de reutilização da FEBRABAN.
pub fn fator_vencimento(vencimento: NaiveDate) -> CobrancaResult<u16> {
    let dias = (vencimento - DATA_BASE_FATOR).num_days();

    if dias < 0 {
        return Err(CobrancaError::Validation(format!(
            "vencimento {vencimento} anterior à data base do fator ({DATA_BASE_FATOR})"
        )));
    }

    let fator = if dias > 9999 {
        (dias - 1000) % 9000 + 1000
    } else {
        dias
    };

    Ok(fator as u16)
}

/// Converte um valor monetário em centavos, exigindo precisão máxima de 2 casas.
pub fn valor_em_centavos(valor: Decimal) -> CobrancaResult<u64> {
    if valor.is_sign_negative() {
        return Err(CobrancaError::Validation(format!("valor negativo: {valor}")));
    }

    let centavos = valor
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| CobrancaError::Validation(format!("valor fora do intervalo: {valor}")))?;

    if centavos.fract() != Decimal::ZERO {
        return Err(CobrancaError::Validation(format!(
            "valor com mais de 2 casas decimais: {valor}"
        )));
    }

    centavos
        .to_u64()
        .ok_or_else(|| CobrancaError::Validation(format!("valor fora do intervalo: {valor}")))
}

/// Converte centavos de volta em valor monetário com 2 casas.
pub fn centavos_em_valor(centavos: u64) -> Decimal {
    Decimal::new(centavos as i64, 2)
}

pub fn apenas_digitos(texto: &str) -> bool {
    !texto.is_empty() && texto.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(a: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(a, m, d).unwrap()
    }

    #[test]
    fn modulo10_dos_campos() {
        assert_eq!(modulo10("237912345").unwrap(), 4);
        assert_eq!(modulo10("6700000000").unwrap(), 9);
        assert_eq!(modulo10("0630").unwrap(), 4);
    }

    #[test]
    fn digito_verificador_rejeita_caracteres_nao_numericos() {
        for entrada in ["12-4567", "12 45", "", "1234a"] {
            assert!(matches!(modulo10(entrada), Err(CobrancaError::Validation(_))));
            assert!(matches!(modulo11(entrada), Err(CobrancaError::Validation(_))));
        }
    }

    #[test]
    fn modulo11_confere_codigo_de_barras_real() {
        // Código de barras do Banco do Brasil com DV geral '3' na posição 5.
        let codigo = "00193373700000001000500940144816060680935031";
        let sem_dv = format!("{}{}", &codigo[..4], &codigo[5..]);
        assert_eq!(modulo11(&sem_dv).unwrap(), 3);
    }

    #[test]
    fn modulo11_substitui_restos_especiais_por_um() {
        // 2379 -> soma 9*2 + 7*3 + 3*4 + 2*5 = 61, resto 6, dv 5
        assert_eq!(modulo11("2379").unwrap(), 5);
        // soma 0 -> resto 0 -> 11 -> 1
        assert_eq!(modulo11("0000").unwrap(), 1);
    }

    #[test]
    fn fator_de_vencimento_e_reinicio() {
        assert_eq!(fator_vencimento(data(2000, 7, 3)).unwrap(), 1000);
        assert_eq!(fator_vencimento(data(2024, 1, 10)).unwrap(), 9591);
        assert_eq!(fator_vencimento(data(2025, 2, 21)).unwrap(), 9999);
        assert_eq!(fator_vencimento(data(2025, 2, 22)).unwrap(), 1000);
        assert!(fator_vencimento(data(1997, 10, 6)).is_err());
    }

    #[test]
    fn centavos_exigem_duas_casas() {
        assert_eq!(valor_em_centavos(Decimal::new(10050, 2)).unwrap(), 10050);
        assert_eq!(valor_em_centavos(Decimal::new(75, 0)).unwrap(), 7500);
        assert!(valor_em_centavos(Decimal::new(1001, 3)).is_err());
        assert!(valor_em_centavos(Decimal::new(-1, 0)).is_err());
        assert_eq!(centavos_em_valor(25000), Decimal::new(250, 0));
    }

    #[test]
    fn centavos_de_valor_gigante_sao_recusados() {
        assert!(matches!(
            valor_em_centavos(Decimal::MAX),
            Err(CobrancaError::Validation(_))
        ));
    }
}
