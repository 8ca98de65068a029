// Servidor de desarrollo que imita el sandbox externo con el Python local.
// No aísla nada: solo sirve para probar `LESSON_SANDBOX=remote` en local.

use std::net::TcpListener;
use std::sync::Arc;

use lesson_engine::config::EngineConfig;
use lesson_engine::judge::judge_python::LocalPython;
use lesson_engine::judge::judge_remote::RUN_PATH;
use lesson_engine::judge::sandbox_server::serve;
use lesson_engine::logger::init_logger;
use log::{error, info};

fn main() {
    let config = EngineConfig::from_env();
    if let Err(err) = init_logger(&config.log_level, config.log_file.as_deref()) {
        eprintln!("no se pudo iniciar el logger: {err}");
    }

    let python = match LocalPython::detect() {
        Ok(python) => python.with_timeout_ms(config.python_timeout_ms),
        Err(err) => {
            error!("{err}");
            std::process::exit(2);
        }
    };

    let listener = match TcpListener::bind(&config.sandbox_bind) {
        Ok(listener) => listener,
        Err(err) => {
            error!("no se pudo abrir {}: {err}", config.sandbox_bind);
            std::process::exit(2);
        }
    };

    info!(
        "sandbox de desarrollo escuchando en http://{}{RUN_PATH} (python: {})",
        config.sandbox_bind,
        python.interpreter().display()
    );
    serve(listener, Arc::new(python));
}
