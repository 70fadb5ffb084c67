use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stepform::api::SessionContext;
use stepform::state::{AuxData, FetchStatus, FormContext, FormState};
use stepform::{FormLifecycle, Value, WizardConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stepform", version, about = "Compose and check declarative multi-step forms")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the JSON Schema of wizard files.
    Schema,
    /// Print the form state seeded from a resource document.
    Init {
        wizard: PathBuf,
        #[arg(long)]
        doc: Option<PathBuf>,
    },
    /// Print the ids of the steps active for a form state.
    Steps {
        wizard: PathBuf,
        #[arg(long)]
        state: Option<PathBuf>,
        /// JSON object of fetch results keyed by fetch key.
        #[arg(long)]
        aux: Option<PathBuf>,
    },
    /// Validate a form state and print the payload it submits.
    Submit {
        wizard: PathBuf,
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        doc: Option<PathBuf>,
        /// JSON object of fetch results keyed by fetch key. Required
        /// fields whose options come from a missing key are reported.
        #[arg(long)]
        aux: Option<PathBuf>,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> CliResult<ExitCode> {
    let session = SessionContext::default();

    match command {
        Command::Schema => {
            let schema = WizardConfig::json_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Command::Init { wizard, doc } => {
            let lifecycle = WizardConfig::from_path(&wizard)?.into_lifecycle()?;
            let document = doc.as_deref().map(read_json).transpose()?;
            let empty = FormState::new();
            let aux = AuxData::new();
            let ctx = FormContext::new(&empty, &session, &aux).with_initial(document.as_ref());
            let state = lifecycle
                .transform_initial_value(document.as_ref().unwrap_or(&Value::None), &ctx)?;
            print_value(state.to_value())?;
        }
        Command::Steps { wizard, state, aux } => {
            let lifecycle = WizardConfig::from_path(&wizard)?.into_lifecycle()?;
            let aux = read_aux(aux.as_deref())?;
            let state = match state.as_deref() {
                Some(path) => FormState::from_value(&read_json(path)?)?,
                None => FormState::new(),
            };
            let active = lifecycle.resolve(&FormContext::new(&state, &session, &aux))?;
            for id in active.ids() {
                println!("{id}");
            }
        }
        Command::Submit {
            wizard,
            state,
            doc,
            aux,
        } => {
            let lifecycle = WizardConfig::from_path(&wizard)?.into_lifecycle()?;
            let aux = read_aux(aux.as_deref())?;
            let state = FormState::from_value(&read_json(&state)?)?;
            let document = doc.as_deref().map(read_json).transpose()?;
            let ctx = FormContext::new(&state, &session, &aux).with_initial(document.as_ref());

            let issues = lifecycle.schema(&ctx)?.validate(&ctx);
            if !issues.is_empty() {
                for issue in &issues {
                    eprintln!("{issue}");
                }
                return Ok(ExitCode::from(2));
            }
            let payload = lifecycle.transform_before_submit(&state, document.as_ref(), &ctx)?;
            print_value(payload)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_json(path: &Path) -> CliResult<Value> {
    let raw = std::fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(raw.as_str())?;
    Ok(Value::from(json))
}

fn read_aux(path: Option<&Path>) -> CliResult<AuxData> {
    let mut aux = AuxData::new();
    let Some(path) = path else {
        return Ok(aux);
    };
    match read_json(path)? {
        Value::Object(results) => {
            for (key, value) in results {
                aux.set(key, FetchStatus::Ready(value));
            }
            Ok(aux)
        }
        other => Err(format!("fetch results must be a JSON object, found {}", other.type_name()).into()),
    }
}

fn print_value(value: Value) -> CliResult<()> {
    let json = serde_json::Value::from(value);
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
