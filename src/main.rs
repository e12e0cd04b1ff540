use execution_time::ExecutionTime;
use std::process;
use tracing_subscriber::EnvFilter;

use cobranca_cnab::{
    CobrancaResult, clear_screen, executar, get_config, imprimir_versao_do_programa,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // A forma mais idiomática de reportar erros ao usuário final sem stack trace técnico
    if let Err(err) = run() {
        eprintln!("\n[ERRO CRÍTICO]: {err}");
        process::exit(1);
    }
}

fn run() -> CobrancaResult<()> {
    let timer = ExecutionTime::start();

    // 1. Argumentos e configuração do convênio
    let config = get_config()?;

    // 2. Setup inicial
    clear_screen(config.clear)?;
    imprimir_versao_do_programa();

    if config.verbose {
        println!("{:#?}\n", config);
    }

    // 3. Subcomando
    executar(&config)?;

    timer.print_elapsed_time();

    Ok(())
}
