use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use firs_core::InvoicePipeline;
use firs_core::invoice::sign::{RsaSha256PublicKey, digest_base64};
use firs_core::invoice::{
    C14nMethod, DEFAULT_TEMPLATE, InvoiceRequest, InvoiceSigner, InvoiceVerifier, PngQrEncoder,
    QrEncoder, Template, UnmatchedPlaceholders, project, render_html,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "firs")]
#[command(about = "Offline tools for the FIRS e-invoicing simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill the template from a JSON invoice request.
    Render {
        #[arg(long)]
        request: PathBuf,
        #[command(flatten)]
        template: TemplateArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Render and sign in one step.
    Issue {
        #[arg(long)]
        request: PathBuf,
        #[command(flatten)]
        template: TemplateArgs,
        #[command(flatten)]
        key: SigningArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Sign an already rendered XML invoice.
    Sign {
        #[arg(long)]
        invoice: PathBuf,
        #[command(flatten)]
        key: SigningArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check the enveloped signature of a signed invoice.
    Verify {
        #[arg(long)]
        invoice: PathBuf,
        /// SPKI or PKCS#1 public key PEM.
        #[arg(long, group = "verifying_key")]
        public_key: Option<PathBuf>,
        #[arg(long, group = "verifying_key")]
        certificate: Option<PathBuf>,
        #[arg(long, group = "verifying_key")]
        private_key: Option<PathBuf>,
    },
    /// Print the base64 SHA-256 reference digest.
    Digest {
        #[arg(long)]
        invoice: PathBuf,
        #[arg(long, default_value_t = C14nMethod::Exclusive)]
        c14n: C14nMethod,
    },
    /// Render the human view of a signed invoice.
    View {
        #[arg(long)]
        invoice: PathBuf,
        /// Print the display model as JSON instead of HTML.
        #[arg(long)]
        json: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Encode text as a base64 PNG QR code.
    Qr {
        #[arg(long)]
        data: String,
        #[arg(long, default_value_t = 200)]
        size: u32,
    },
}

#[derive(Args)]
struct TemplateArgs {
    /// XML template; the built-in UBL template when omitted.
    #[arg(long)]
    template: Option<PathBuf>,
    #[arg(long, default_value_t = UnmatchedPlaceholders::Keep)]
    unmatched: UnmatchedPlaceholders,
}

impl TemplateArgs {
    fn load(&self) -> Result<Template> {
        let template = match &self.template {
            Some(path) => Template::from_file(path)?,
            None => Template::parse(DEFAULT_TEMPLATE)?,
        };
        Ok(template.with_unmatched(self.unmatched))
    }
}

#[derive(Args)]
struct SigningArgs {
    #[arg(long)]
    private_key: PathBuf,
    /// Certificate embedded in KeyInfo; must match the private key.
    #[arg(long)]
    certificate: Option<PathBuf>,
    #[arg(long, default_value_t = C14nMethod::Exclusive)]
    c14n: C14nMethod,
}

impl SigningArgs {
    fn signer(&self) -> Result<InvoiceSigner> {
        let key = read(&self.private_key)?;
        let signer = match &self.certificate {
            Some(path) => InvoiceSigner::from_pem_with_certificate(&key, &read(path)?)?,
            None => InvoiceSigner::from_pem(&key)?,
        };
        Ok(signer.with_c14n(self.c14n))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            request,
            template,
            output,
        } => {
            let request = load_request(&request)?;
            emit(output.as_deref(), &template.load()?.render(&request))?;
        }
        Commands::Issue {
            request,
            template,
            key,
            output,
        } => {
            let request = load_request(&request)?;
            let pipeline = InvoicePipeline::new(template.load()?, key.signer()?);
            emit(output.as_deref(), &pipeline.issue(&request)?)?;
        }
        Commands::Sign {
            invoice,
            key,
            output,
        } => {
            let signed = key.signer()?.sign_xml(&read(&invoice)?)?;
            emit(output.as_deref(), &signed)?;
        }
        Commands::Verify {
            invoice,
            public_key,
            certificate,
            private_key,
        } => {
            let verifier = if let Some(path) = public_key {
                InvoiceVerifier::from_public_key_pem(&read(&path)?)?
            } else if let Some(path) = certificate {
                InvoiceVerifier::new(RsaSha256PublicKey::from_certificate_pem(&read(&path)?)?)
            } else if let Some(path) = private_key {
                InvoiceSigner::from_pem(&read(&path)?)?.verifier()
            } else {
                bail!("one of --public-key, --certificate or --private-key is required");
            };
            verifier
                .verify(&read(&invoice)?)
                .with_context(|| format!("{} failed verification", invoice.display()))?;
            println!("valid");
        }
        Commands::Digest { invoice, c14n } => {
            println!("{}", digest_base64(&read(&invoice)?, c14n)?);
        }
        Commands::View {
            invoice,
            json,
            output,
        } => {
            let model = project(&read(&invoice)?)?;
            let rendered = if json {
                serde_json::to_string_pretty(&model)?
            } else {
                render_html(&model, &model.irn)
            };
            emit(output.as_deref(), &rendered)?;
        }
        Commands::Qr { data, size } => {
            println!("{}", PngQrEncoder::new(size).encode_base64(&data)?);
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_request(path: &Path) -> Result<InvoiceRequest> {
    InvoiceRequest::from_json(&read(path)?)
        .with_context(|| format!("invalid invoice request in {}", path.display()))
}

fn emit(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = content.len(), "wrote output");
        }
        None => println!("{content}"),
    }
    Ok(())
}
