use chrono::NaiveDate;
use std::sync::LazyLock;

use crate::{
    Codificacao, CobrancaError, CobrancaResult, FormatoData, apenas_digitos, normalizar_texto,
};

/// Colunas reservadas ao número sequencial no fim de cada registro.
pub const LARGURA_SEQUENCIAL: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipoCampo {
    /// Alinhado à direita, preenchido com zeros.
    Numerico,
    /// Alinhado à esquerda, preenchido com brancos.
    Alfanumerico,
}

#[derive(Debug, Clone)]
pub struct Campo {
    pub nome: &'static str,
    /// Posição inicial (base 0).
    pub inicio: usize,
    pub tamanho: usize,
    pub tipo: TipoCampo,
}

/// Tabela ordenada de campos de um tipo de registro.
#[derive(Debug, Clone)]
pub struct LayoutRegistro {
    pub largura: usize,
    campos: Vec<Campo>,
    posicao: usize,
}

impl LayoutRegistro {
    pub fn novo(largura: usize) -> Self {
        Self {
            largura,
            campos: Vec::new(),
            posicao: 0,
        }
    }

    pub fn numerico(self, nome: &'static str, tamanho: usize) -> Self {
        self.campo(nome, tamanho, TipoCampo::Numerico)
    }

    pub fn alfa(self, nome: &'static str, tamanho: usize) -> Self {
        self.campo(nome, tamanho, TipoCampo::Alfanumerico)
    }

    fn campo(mut self, nome: &'static str, tamanho: usize, tipo: TipoCampo) -> Self {
        self.campos.push(Campo {
            nome,
            inicio: self.posicao,
            tamanho,
            tipo,
        });
        self.posicao += tamanho;
        self
    }

    /// Completa com brancos até o sequencial e confere a largura total.
    pub fn fechar(self) -> CobrancaResult<Self> {
        let limite = self.largura.saturating_sub(LARGURA_SEQUENCIAL);

        if self.posicao > limite {
            return Err(CobrancaError::InvalidConfiguration(format!(
                "campos ocupam {} posições, máximo para registro de {} é {}",
                self.posicao, self.largura, limite
            )));
        }

        let brancos = limite - self.posicao;
        Ok(self
            .alfa("brancos", brancos)
            .numerico("sequencial", LARGURA_SEQUENCIAL))
    }

    fn buscar(&self, nome: &str) -> CobrancaResult<&Campo> {
        self.campos
            .iter()
            .find(|c| c.nome == nome)
            .ok_or_else(|| {
                CobrancaError::InvalidConfiguration(format!("campo <{nome}> inexistente no layout"))
            })
    }

    pub fn registro(&self) -> RegistroMontado<'_> {
        let mut conteudo = vec![b' '; self.largura];
        for campo in self.campos.iter().filter(|c| c.tipo == TipoCampo::Numerico) {
            conteudo[campo.inicio..campo.inicio + campo.tamanho].fill(b'0');
        }
        RegistroMontado {
            layout: self,
            conteudo,
        }
    }

    pub fn ler<'a>(&'a self, linha: &'a str, numero_linha: usize) -> CobrancaResult<RegistroLido<'a>> {
        if !linha.is_ascii() {
            return Err(CobrancaError::malformado(numero_linha, "caracteres fora do ASCII"));
        }
        if linha.len() != self.largura {
            return Err(CobrancaError::malformado(
                numero_linha,
                format!(
                    "largura {} diferente da esperada ({})",
                    linha.len(),
                    self.largura
                ),
            ));
        }
        Ok(RegistroLido {
            layout: self,
            linha,
            numero_linha,
        })
    }
}

/// Registro em montagem; campos não preenchidos ficam com zeros ou brancos.
pub struct RegistroMontado<'a> {
    layout: &'a LayoutRegistro,
    conteudo: Vec<u8>,
}

impl RegistroMontado<'_> {
    pub fn preencher(&mut self, nome: &str, valor: &str) -> CobrancaResult<&mut Self> {
        let layout = self.layout;
        let campo = layout.buscar(nome)?;

        let texto = match campo.tipo {
            TipoCampo::Numerico => {
                if !apenas_digitos(valor) || valor.len() > campo.tamanho {
                    return Err(CobrancaError::Validation(format!(
                        "campo <{nome}> exige até {} dígitos: <{valor}>",
                        campo.tamanho
                    )));
                }
                format!("{:0>largura$}", valor, largura = campo.tamanho)
            }
            TipoCampo::Alfanumerico => {
                let normalizado: String = normalizar_texto(valor)
                    .chars()
                    .take(campo.tamanho)
                    .collect();
                format!("{:<largura$}", normalizado, largura = campo.tamanho)
            }
        };

        self.conteudo[campo.inicio..campo.inicio + campo.tamanho].copy_from_slice(texto.as_bytes());
        Ok(self)
    }

    pub fn numero(&mut self, nome: &str, valor: u64) -> CobrancaResult<&mut Self> {
        self.preencher(nome, &valor.to_string())
    }

    pub fn data(&mut self, nome: &str, data: NaiveDate, formato: FormatoData) -> CobrancaResult<&mut Self> {
        self.preencher(nome, &formatar_data(data, formato))
    }

    pub fn finalizar(mut self, sequencial: usize) -> CobrancaResult<String> {
        self.numero("sequencial", sequencial as u64)?;
        // Campos alfanuméricos normalizados contêm apenas ASCII.
        String::from_utf8(self.conteudo)
            .map_err(|e| CobrancaError::Validation(format!("registro não ASCII: {e}")))
    }
}

/// Visão de leitura sobre uma linha já conferida quanto à largura.
pub struct RegistroLido<'a> {
    layout: &'a LayoutRegistro,
    linha: &'a str,
    pub numero_linha: usize,
}

impl<'a> RegistroLido<'a> {
    pub fn bruto(&self, nome: &str) -> CobrancaResult<&'a str> {
        let (layout, linha) = (self.layout, self.linha);
        let campo = layout.buscar(nome)?;
        Ok(&linha[campo.inicio..campo.inicio + campo.tamanho])
    }

    pub fn texto(&self, nome: &str) -> CobrancaResult<&'a str> {
        Ok(self.bruto(nome)?.trim())
    }

    pub fn digitos(&self, nome: &str) -> CobrancaResult<&'a str> {
        let valor = self.bruto(nome)?;
        if !apenas_digitos(valor) {
            return Err(CobrancaError::malformado(
                self.numero_linha,
                format!("campo <{nome}> não numérico: <{valor}>"),
            ));
        }
        Ok(valor)
    }

    pub fn numero(&self, nome: &str) -> CobrancaResult<u64> {
        let valor = self.digitos(nome)?;
        valor.parse().map_err(|_| {
            CobrancaError::malformado(self.numero_linha, format!("campo <{nome}> fora do intervalo"))
        })
    }

    /// Datas zeradas significam "não informada".
    pub fn data(&self, nome: &str, formato: FormatoData) -> CobrancaResult<Option<NaiveDate>> {
        let valor = self.digitos(nome)?;
        if valor.bytes().all(|b| b == b'0') {
            return Ok(None);
        }
        ler_data(valor, formato).map(Some).ok_or_else(|| {
            CobrancaError::malformado(self.numero_linha, format!("data inválida em <{nome}>: {valor}"))
        })
    }
}

pub fn formatar_data(data: NaiveDate, formato: FormatoData) -> String {
    data.format(formato.padrao_chrono()).to_string()
}

/// Anos com dois dígitos são lidos sempre como 20AA.
pub fn ler_data(texto: &str, formato: FormatoData) -> Option<NaiveDate> {
    match formato {
        FormatoData::Ddmmaa => {
            let dia = texto.get(0..2)?.parse().ok()?;
            let mes = texto.get(2..4)?.parse().ok()?;
            let ano: i32 = texto.get(4..6)?.parse().ok()?;
            NaiveDate::from_ymd_opt(2000 + ano, mes, dia)
        }
        _ => NaiveDate::parse_from_str(texto, formato.padrao_chrono()).ok(),
    }
}

// --- Codificação dos bytes ---

/// Página de código 037 para o repertório ASCII imprimível.
fn ascii_para_ebcdic(b: u8) -> Option<u8> {
    let convertido = match b {
        b'0'..=b'9' => 0xF0 + (b - b'0'),
        b'A'..=b'I' => 0xC1 + (b - b'A'),
        b'J'..=b'R' => 0xD1 + (b - b'J'),
        b'S'..=b'Z' => 0xE2 + (b - b'S'),
        b'a'..=b'i' => 0x81 + (b - b'a'),
        b'j'..=b'r' => 0x91 + (b - b'j'),
        b's'..=b'z' => 0xA2 + (b - b's'),
        b' ' => 0x40,
        b'!' => 0x5A,
        b'"' => 0x7F,
        b'#' => 0x7B,
        b'$' => 0x5B,
        b'%' => 0x6C,
        b'&' => 0x50,
        b'\'' => 0x7D,
        b'(' => 0x4D,
        b')' => 0x5D,
        b'*' => 0x5C,
        b'+' => 0x4E,
        b',' => 0x6B,
        b'-' => 0x60,
        b'.' => 0x4B,
        b'/' => 0x61,
        b':' => 0x7A,
        b';' => 0x5E,
        b'<' => 0x4C,
        b'=' => 0x7E,
        b'>' => 0x6E,
        b'?' => 0x6F,
        b'@' => 0x7C,
        b'[' => 0xBA,
        b'\\' => 0xE0,
        b']' => 0xBB,
        b'^' => 0xB0,
        b'_' => 0x6D,
        b'`' => 0x79,
        b'{' => 0xC0,
        b'|' => 0x4F,
        b'}' => 0xD0,
        b'~' => 0xA1,
        _ => return None,
    };
    Some(convertido)
}

static EBCDIC_PARA_ASCII: LazyLock<[Option<u8>; 256]> = LazyLock::new(|| {
    let mut tabela = [None; 256];
    for b in 0x20u8..=0x7E {
        if let Some(e) = ascii_para_ebcdic(b) {
            tabela[e as usize] = Some(b);
        }
    }
    tabela
});

/// Converte registros montados nos bytes do arquivo.
pub fn codificar_registros(registros: &[String], codificacao: Codificacao) -> CobrancaResult<Vec<u8>> {
    let total: usize = registros.iter().map(|r| r.len() + 2).sum();
    let mut saida = Vec::with_capacity(total);

    for (i, registro) in registros.iter().enumerate() {
        match codificacao {
            Codificacao::Ascii => {
                saida.extend_from_slice(registro.as_bytes());
                saida.extend_from_slice(b"\r\n");
            }
            Codificacao::Ebcdic => {
                for b in registro.bytes() {
                    let e = ascii_para_ebcdic(b).ok_or_else(|| {
                        CobrancaError::Validation(format!(
                            "registro {}: caractere sem representação EBCDIC: {:?}",
                            i + 1,
                            b as char
                        ))
                    })?;
                    saida.push(e);
                }
            }
        }
    }

    Ok(saida)
}

/// Linha do arquivo com numeração a partir de 1, já convertida para ASCII.
pub type LinhaDecodificada = (usize, CobrancaResult<String>);

/// Separa os bytes em linhas. Falhas de conversão são atribuídas à linha,
/// sem interromper as demais.
pub fn decodificar_registros(
    conteudo: &[u8],
    codificacao: Codificacao,
    largura: usize,
) -> Vec<LinhaDecodificada> {
    match codificacao {
        Codificacao::Ascii => {
            let mut linhas: Vec<&[u8]> = conteudo.split(|&b| b == b'\n').collect();
            // Terminador final não abre uma nova linha.
            if linhas.last().is_some_and(|l| l.is_empty()) {
                linhas.pop();
            }

            linhas
                .into_iter()
                .enumerate()
                .map(|(i, linha)| {
                    let numero = i + 1;
                    let linha = linha.strip_suffix(b"\r").unwrap_or(linha);
                    let texto = if linha.is_ascii() {
                        String::from_utf8(linha.to_vec())
                            .map_err(|e| CobrancaError::malformado(numero, e.to_string()))
                    } else {
                        Err(CobrancaError::malformado(numero, "caracteres fora do ASCII"))
                    };
                    (numero, texto)
                })
                .collect()
        }
        Codificacao::Ebcdic => conteudo
            .chunks(largura.max(1))
            .enumerate()
            .map(|(i, bloco)| {
                let numero = i + 1;
                let texto = bloco
                    .iter()
                    .map(|&e| {
                        EBCDIC_PARA_ASCII[e as usize].map(char::from).ok_or_else(|| {
                            CobrancaError::malformado(numero, format!("byte EBCDIC inválido: {e:#04x}"))
                        })
                    })
                    .collect::<CobrancaResult<String>>();
                (numero, texto)
            })
            .collect(),
    }
}
