use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};

/// Nome de arquivo de remessa: REMYYYYMMDDHHmmss.rem
/// i: case-insensitive
/// x: modo verbose (ignora espaços e permite comentários)
pub static REGEX_ARQUIVO_REMESSA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^ REM
        (?P<data> \d{8} )   # AAAAMMDD
        (?P<hora> \d{6} )   # HHmmss
        \.rem $
        ",
    )
    .unwrap()
});

// Regex para limpeza e validação
pub static RE_MULTISPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());
pub static RE_NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());
pub static RE_CODIGO_BARRAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{44}$").unwrap());
pub static RE_LINHA_DIGITAVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{47}$").unwrap());

/// Remove pontos, espaços e demais separadores de um código digitado.
pub fn somente_digitos(texto: &str) -> Cow<'_, str> {
    RE_NON_DIGITS.replace_all(texto, "")
}

/// Normaliza texto livre para campos alfanuméricos CNAB:
/// maiúsculas, sem acentos, espaços múltiplos reduzidos a um.
pub fn normalizar_texto(texto: &str) -> String {
    let sem_acentos: String = texto
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' | 'Ç' => 'C',
            'ñ' | 'Ñ' => 'N',
            c if c.is_ascii_graphic() || c == ' ' => c.to_ascii_uppercase(),
            _ => ' ',
        })
        .collect();

    RE_MULTISPACE
        .replace_all(sem_acentos.trim(), " ")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normaliza_nomes_com_acentos() {
        assert_eq!(
            normalizar_texto("  José   da Conceição\tÁvila "),
            "JOSE DA CONCEICAO AVILA"
        );
    }

    #[test]
    fn reconhece_nome_de_remessa() {
        let caps = REGEX_ARQUIVO_REMESSA
            .captures("REM20240105093000.rem")
            .unwrap();
        assert_eq!(&caps["data"], "20240105");
        assert!(!REGEX_ARQUIVO_REMESSA.is_match("REM2024.rem"));
    }

    #[test]
    fn remove_separadores() {
        assert_eq!(somente_digitos("23791.23454 67000"), "237912345467000");
    }
}
