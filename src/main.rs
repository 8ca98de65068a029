// uso: lesson_grade <lección.yaml> <sección> <entrega.py>

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use lesson_engine::app::runner::CodeExerciseState;
use lesson_engine::completion::code_tracker;
use lesson_engine::config::EngineConfig;
use lesson_engine::data::read_lesson_file;
use lesson_engine::error::{LessonError, SandboxError};
use lesson_engine::judge::{GradeOutcome, format_grade_message, grade};
use lesson_engine::logger::init_logger;
use lesson_engine::model::Section;
use log::{error, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("uso: lesson_grade <lección.yaml> <id_sección> <entrega.py>")]
    Usage,

    #[error(transparent)]
    Lesson(#[from] LessonError),

    #[error("la sección {0:?} no existe o no es un ejercicio de código")]
    NotACodeSection(String),

    #[error("no se pudo leer la entrega {}: {source}", path.display())]
    Submission {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

struct Args {
    lesson: PathBuf,
    section: String,
    submission: PathBuf,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, CliError> {
    let (Some(lesson), Some(section), Some(submission), None) =
        (args.next(), args.next(), args.next(), args.next())
    else {
        return Err(CliError::Usage);
    };
    Ok(Args {
        lesson: PathBuf::from(lesson),
        section,
        submission: PathBuf::from(submission),
    })
}

fn main() -> ExitCode {
    let config = EngineConfig::from_env();
    if let Err(err) = init_logger(&config.log_level, config.log_file.as_deref()) {
        eprintln!("no se pudo iniciar el logger: {err}");
    }

    match run(&config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

fn run(config: &EngineConfig) -> Result<ExitCode, CliError> {
    let args = parse_args(std::env::args().skip(1))?;
    let lesson = read_lesson_file(&args.lesson)?;
    let Some(Section::Code(section)) = lesson.section(&args.section) else {
        return Err(CliError::NotACodeSection(args.section));
    };
    let source = std::fs::read_to_string(&args.submission).map_err(|source| {
        CliError::Submission {
            path: args.submission.clone(),
            source,
        }
    })?;

    let sandbox = config.build_sandbox()?;
    info!(
        "evaluando {}/{}/{}",
        lesson.unit_id, lesson.lesson_id, section.id
    );
    let outcome = grade(&*sandbox, &source, &section.target, &section.tests);
    println!("{}", format_grade_message(&outcome));

    if let Some(state) = CodeExerciseState::from_outcome(&source, &outcome) {
        let mut store = config.progress_store();
        let tracker = code_tracker(lesson.key_for(&section.id));
        tracker.write(&mut store, &state, Instant::now());
        if let Err(err) = store.flush_all() {
            warn!(
                "no se pudo guardar el progreso en {}: {err}",
                config.progress_path.display()
            );
        }
    }

    Ok(match &outcome {
        GradeOutcome::Graded { .. } if outcome.all_passed() => ExitCode::SUCCESS,
        GradeOutcome::Graded { .. } | GradeOutcome::HarnessFailure { .. } => ExitCode::from(1),
        GradeOutcome::ConfigurationError { message } | GradeOutcome::InternalError { message } => {
            error!("{message}");
            ExitCode::from(2)
        }
    })
}
