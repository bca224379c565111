use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for a tgx process.
///
/// Output goes to stderr; stdout is reserved for data the commands print.
pub fn init(service_name: &str) -> Result<()> {
    // Workspace crates log at info, dependencies at warn. `RUST_LOG` overrides.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,tgx=info,tgx_core=info,{service_name}=info"))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))
}
