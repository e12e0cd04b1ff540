use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use tracing::debug;

use crate::{AtualizacaoBoleto, Boleto, CobrancaError, CobrancaResult, StatusBoleto};

/// Colaborador de persistência dos boletos.
///
/// O núcleo não conhece banco de dados: recebe este contrato e executa
/// exatamente uma atualização por registro conciliado.
pub trait RepositorioBoletos {
    fn buscar_por_nosso_numero(&self, nosso_numero: &str) -> CobrancaResult<Option<Boleto>>;

    fn atualizar(&mut self, id: &str, atualizacao: &AtualizacaoBoleto) -> CobrancaResult<Boleto>;

    /// Resolve os ids selecionados para remessa. Lista vazia seleciona todos
    /// os boletos gerados. A elegibilidade é verificada pelo codificador.
    fn listar_elegiveis_para_remessa(&self, ids: &[String]) -> CobrancaResult<Vec<Boleto>>;

    fn inserir(&mut self, boleto: Boleto) -> CobrancaResult<()>;

    /// Parcelas pagas do contrato, apuradas por recontagem (nunca um contador mutável).
    fn parcelas_pagas(&self, contrato_id: &str) -> CobrancaResult<usize>;
}

/// Repositório em memória, com carga e gravação em CSV delimitado por ';'.
#[derive(Debug, Default)]
pub struct MemoriaBoletos {
    boletos: Vec<Boleto>,
    por_id: HashMap<String, usize>,
    por_nosso_numero: HashMap<String, usize>,
    atualizacoes: usize,
}

impl MemoriaBoletos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn com_boletos(boletos: impl IntoIterator<Item = Boleto>) -> CobrancaResult<Self> {
        let mut repositorio = Self::new();
        for boleto in boletos {
            repositorio.inserir(boleto)?;
        }
        Ok(repositorio)
    }

    pub fn carregar_csv(path: &Path) -> CobrancaResult<Self> {
        let file = File::open(path).map_err(|e| CobrancaError::IoReader {
            source: e,
            arquivo: path.to_path_buf(),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let boletos = rdr
            .deserialize::<Boleto>()
            .collect::<Result<Vec<_>, csv::Error>>()?;

        debug!("{} boletos carregados de {:?}", boletos.len(), path);

        Self::com_boletos(boletos)
    }

    pub fn salvar_csv(&self, path: &Path) -> CobrancaResult<()> {
        let file = File::create(path)?;
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(BufWriter::new(file));

        for boleto in &self.boletos {
            wtr.serialize(boleto)?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn boletos(&self) -> &[Boleto] {
        &self.boletos
    }

    pub fn buscar_por_id(&self, id: &str) -> Option<&Boleto> {
        self.por_id.get(id).map(|&i| &self.boletos[i])
    }

    /// Quantidade de chamadas a `atualizar` que alteraram algum boleto.
    pub fn total_de_atualizacoes(&self) -> usize {
        self.atualizacoes
    }
}

impl RepositorioBoletos for MemoriaBoletos {
    fn buscar_por_nosso_numero(&self, nosso_numero: &str) -> CobrancaResult<Option<Boleto>> {
        Ok(self
            .por_nosso_numero
            .get(nosso_numero)
            .map(|&i| self.boletos[i].clone()))
    }

    fn atualizar(&mut self, id: &str, atualizacao: &AtualizacaoBoleto) -> CobrancaResult<Boleto> {
        let indice = *self
            .por_id
            .get(id)
            .ok_or_else(|| CobrancaError::BoletoNotFound(id.to_string()))?;

        let boleto = &mut self.boletos[indice];
        boleto.aplicar(atualizacao);
        self.atualizacoes += 1;

        Ok(boleto.clone())
    }

    fn listar_elegiveis_para_remessa(&self, ids: &[String]) -> CobrancaResult<Vec<Boleto>> {
        if ids.is_empty() {
            return Ok(self
                .boletos
                .iter()
                .filter(|b| b.status == StatusBoleto::Gerado)
                .cloned()
                .collect());
        }

        let ausentes: Vec<&str> = ids
            .iter()
            .filter(|id| !self.por_id.contains_key(id.as_str()))
            .map(String::as_str)
            .collect();

        if !ausentes.is_empty() {
            return Err(CobrancaError::Validation(format!(
                "ids de boleto desconhecidos: {}",
                ausentes.join(", ")
            )));
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.buscar_por_id(id))
            .cloned()
            .collect())
    }

    fn inserir(&mut self, boleto: Boleto) -> CobrancaResult<()> {
        if self.por_nosso_numero.contains_key(&boleto.nosso_numero) {
            return Err(CobrancaError::IdentifierCollision {
                nosso_numero: boleto.nosso_numero,
                tentativas: 1,
            });
        }
        if self.por_id.contains_key(&boleto.id) {
            return Err(CobrancaError::Validation(format!(
                "id de boleto duplicado: {}",
                boleto.id
            )));
        }

        let indice = self.boletos.len();
        self.por_id.insert(boleto.id.clone(), indice);
        self.por_nosso_numero
            .insert(boleto.nosso_numero.clone(), indice);
        self.boletos.push(boleto);

        Ok(())
    }

    fn parcelas_pagas(&self, contrato_id: &str) -> CobrancaResult<usize> {
        Ok(self
            .boletos
            .iter()
            .filter(|b| b.contrato_id == contrato_id && b.status == StatusBoleto::Pago)
            .count())
    }
}
