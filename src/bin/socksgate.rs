use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use socksgate::{
    ChildSupervisor, DirectDialer, ProxyMode, Socks5Server, SystemProxy, sysproxy::exec_dir,
};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "A SOCKS5 front end with gated handoff", long_about = None)]
struct Args {
    /// Listener address
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    listen: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Switch the system proxy while running
    #[arg(long, value_enum)]
    system_proxy: Option<SystemProxyMode>,

    /// PAC script URL for --system-proxy auto
    #[arg(long)]
    pac_url: Option<String>,

    /// Run the bundled privoxy with this config file
    #[arg(long)]
    privoxy_conf: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SystemProxyMode {
    Auto,
    Global,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    // Bind first so global mode can point at the real address
    let mut server = Socks5Server::new(args.listen, DirectDialer::new());
    let addr = server.bind().await?;

    let mode = match args.system_proxy {
        Some(SystemProxyMode::Auto) => Some(ProxyMode::Auto {
            pac_url: args
                .pac_url
                .ok_or_else(|| anyhow!("[ERR] --pac-url is required for auto mode"))?,
        }),
        Some(SystemProxyMode::Global) => Some(ProxyMode::global(addr)),
        Some(SystemProxyMode::Off) => Some(ProxyMode::Off),
        None => None,
    };

    let system_proxy = match &mode {
        Some(mode) => {
            let proxy = SystemProxy::from_exec_dir()?;
            let message = proxy.apply(mode).await?;
            info!("sysproxy: {}", message.trim());
            Some(proxy)
        }
        None => None,
    };

    let mut privoxy = match &args.privoxy_conf {
        Some(conf) => {
            let mut sup = ChildSupervisor::privoxy(&exec_dir()?, conf);
            sup.start()?;
            Some(sup)
        }
        None => None,
    };

    // Run until the listener fails or we're interrupted
    info!("Starting SOCKS5 proxy: {}", addr);
    let result = tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    };

    if let Some(sup) = privoxy.as_mut() {
        if let Err(e) = sup.stop().await {
            error!("{:#}", e);
        }
    }

    // Leave the system without a dangling proxy setting
    if let (Some(proxy), Some(mode)) = (&system_proxy, &mode) {
        if *mode != ProxyMode::Off {
            if let Err(e) = proxy.apply(&ProxyMode::Off).await {
                error!("{:#}", e);
            }
        }
    }

    result
}
