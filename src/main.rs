use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use fse_referti::config::{self, AppConfig};
use fse_referti::models::document::{Document, DocumentMetadata};
use fse_referti::models::enums::ProviderKind;
use fse_referti::pipeline::analysis::CancellationFlag;
use fse_referti::pipeline::processor::{DocumentPipeline, PipelineError};

#[derive(Parser, Debug)]
#[command(name = "fse-analyze")]
#[command(about = "Extract, de-identify and analyse FSE medical report PDFs")]
#[command(version)]
struct Args {
    #[arg(long, env = "FSE_CONFIG", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Issuing facility, e.g. SYNLAB (applies to every file)")]
    facility: Option<String>,

    #[arg(long, help = "Document type tag (LAB, PS, DIMOSP, SPEC, DOC) or tipologia")]
    doc_type: Option<String>,

    #[arg(long, help = "Override the configured provider")]
    provider: Option<ProviderKind>,

    #[arg(long, help = "Override the configured model")]
    model: Option<String>,

    #[arg(long, help = "Stop after redaction; nothing leaves the machine")]
    redact_only: bool,

    #[arg(long, help = "Pretty-print the JSON report")]
    pretty: bool,

    #[arg(required = true, help = "Report PDFs to process")]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    fse_referti::init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("{}: {e}", config::APP_NAME);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when at least one document failed.
fn run(args: Args) -> Result<bool, PipelineError> {
    let mut app_config = AppConfig::load(args.config.as_deref())?;
    if let Some(kind) = args.provider {
        app_config.override_provider(kind, |key| std::env::var(key).ok());
    }
    if let Some(model) = args.model {
        app_config.provider.model = Some(model);
    }
    if !args.redact_only {
        app_config.validate_provider()?;
    }

    tracing::info!(
        version = config::APP_VERSION,
        files = args.files.len(),
        redact_only = args.redact_only,
        "Starting"
    );

    let pipeline = DocumentPipeline::from_config(&app_config, !args.redact_only)?;
    let documents: Vec<Document> = args
        .files
        .into_iter()
        .map(|path| {
            Document::from_path(
                path,
                DocumentMetadata {
                    facility: args.facility.clone(),
                    document_type: args.doc_type.clone(),
                    patient_ref: None,
                },
            )
        })
        .collect();

    let report = pipeline.run(&documents, &CancellationFlag::new());
    let json = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    match json {
        Ok(out) => println!("{out}"),
        Err(e) => {
            tracing::error!(error = %e, "Cannot serialize report");
            return Ok(false);
        }
    }

    Ok(report.failed().count() == 0)
}
