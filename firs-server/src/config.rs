use clap::Parser;
use firs_core::Config;
use firs_core::invoice::{C14nMethod, UnmatchedPlaceholders};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// FIRS e-invoicing simulator: issues signed UBL invoices over HTTP.
#[derive(Debug, Clone, Parser)]
#[command(name = "firs-server", version, about)]
pub struct ServerArgs {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "FIRS_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// XML invoice template with `{{placeholder}}` tokens.
    #[arg(long, env = "FIRS_TEMPLATE", default_value = "./templates/invoice.xml")]
    pub template: PathBuf,

    /// PEM private key (PKCS#8 or PKCS#1).
    #[arg(long, env = "FIRS_PRIVATE_KEY", default_value = "./private.pem")]
    pub private_key: PathBuf,

    /// PEM certificate embedded in KeyInfo; must match the private key.
    #[arg(long, env = "FIRS_CERTIFICATE")]
    pub certificate: Option<PathBuf>,

    #[arg(long, env = "FIRS_C14N", default_value_t = C14nMethod::Exclusive)]
    pub c14n: C14nMethod,

    #[arg(long, env = "FIRS_UNMATCHED", default_value_t = UnmatchedPlaceholders::Keep)]
    pub unmatched: UnmatchedPlaceholders,

    /// Externally reachable base URL used in QR codes and PDF rendering.
    #[arg(long, env = "FIRS_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Chrome or Chromium binary used for PDF output.
    #[arg(long, env = "FIRS_CHROME", default_value = "chromium")]
    pub chrome: PathBuf,

    #[arg(long, env = "FIRS_PDF_TIMEOUT_SECS", default_value_t = 60)]
    pub pdf_timeout_secs: u64,
}

impl ServerArgs {
    pub fn core_config(&self) -> Config {
        let config = Config::new(&self.template, &self.private_key)
            .with_c14n(self.c14n)
            .with_unmatched(self.unmatched);
        match &self.certificate {
            Some(path) => config.with_certificate(path),
            None => config,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn pdf_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_timeout_secs)
    }
}
