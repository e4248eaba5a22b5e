use anyhow::Context;
use clap::{Parser, Subcommand};
use region_webdriver::{
    ChromeDriver, ConnectionMode, GeoLookup, GeolocationSettings, LocationResolver, ResolverConfig,
    TargetRegion,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Make a browser session present as a target region", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct BrowserArgs {
    /// Chrome executable to launch (downloaded automatically when omitted)
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<String>,

    /// Launch without the Chrome sandbox
    #[arg(long)]
    no_sandbox: bool,

    /// Run Chrome headless
    #[arg(long)]
    headless: bool,

    /// Attach to a running Chrome on this debug port instead of launching one
    #[arg(long)]
    debug_port: Option<u16>,
}

#[derive(clap::Args, Debug)]
struct RegionArgs {
    /// Target region code (ISO 3166 alpha-2)
    #[arg(short, long, default_value = "GB", env = "TARGET_REGION")]
    region: String,

    /// Resolver config file (JSON)
    #[arg(short, long, env = "REGION_RESOLVER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether a page already presents as the region
    Check {
        url: String,

        #[command(flatten)]
        region: RegionArgs,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Change a page's apparent region, printing a JSON report
    Resolve {
        url: String,

        #[command(flatten)]
        region: RegionArgs,

        #[command(flatten)]
        browser: BrowserArgs,

        /// UI strategy retries (config default when omitted)
        #[arg(long)]
        retries: Option<u32>,

        /// Spoof browser geolocation, locale and Accept-Language before navigating
        #[arg(long)]
        geolocation: bool,

        /// Save before/after screenshots into this directory
        #[arg(long)]
        screenshot_dir: Option<PathBuf>,
    },

    /// Guess whether this machine's IP address is in the region
    Ip {
        #[arg(short, long, default_value = "GB")]
        region: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Check {
            url,
            region,
            browser,
        } => {
            let (target, resolver) = load_region(&region).await?;
            let driver = launch(&browser).await?;
            driver.navigate(&url).await?;

            let state = resolver.location_state(&driver, &target).await;
            let signals = resolver.collect_signals(&driver, &target).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "region": target.code(),
                    "current_location": resolver.current_location(&driver, &target).await,
                    "state": state,
                    "signals": signals,
                }))?
            );

            driver.close().await?;
            if !state.is_target_region {
                std::process::exit(1);
            }
        }
        Command::Resolve {
            url,
            region,
            browser,
            retries,
            geolocation,
            screenshot_dir,
        } => {
            let (target, resolver) = load_region(&region).await?;
            let driver = launch(&browser).await?;

            if geolocation {
                driver
                    .apply_geolocation(&GeolocationSettings::for_region(&target))
                    .await?;
            }
            driver.navigate(&url).await?;

            if let Some(dir) = &screenshot_dir {
                save_screenshot(&driver, dir, "initial-page").await;
            }

            log::info!(
                "Signals before resolution: {:?}",
                resolver.collect_signals(&driver, &target).await
            );

            let retries = retries.unwrap_or(resolver.config().default_max_retries);
            let report = resolver.resolve(&driver, &target, retries).await;

            log::info!(
                "Signals after resolution: {:?}",
                resolver.collect_signals(&driver, &target).await
            );

            if let Some(dir) = &screenshot_dir {
                save_screenshot(&driver, dir, "after-location-change").await;
            }

            println!("{}", serde_json::to_string_pretty(&report)?);

            driver.close().await?;
            if !report.success {
                std::process::exit(1);
            }
        }
        Command::Ip { region } => {
            let target = TargetRegion::from_code(&region)?;
            let in_region = GeoLookup::default().is_region_ip_address(&target).await;
            println!("{}", in_region);
        }
    }

    Ok(())
}

async fn load_region(args: &RegionArgs) -> anyhow::Result<(TargetRegion, LocationResolver)> {
    let target = TargetRegion::from_code(&args.region)?;

    let config = match &args.config {
        Some(path) => ResolverConfig::from_file(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ResolverConfig::default(),
    };

    Ok((target, LocationResolver::new(config)))
}

async fn launch(args: &BrowserArgs) -> anyhow::Result<ChromeDriver> {
    let mode = match args.debug_port {
        Some(port) => ConnectionMode::DebugPort(port),
        None => ConnectionMode::Sandboxed {
            chrome_path: args.chrome_path.clone(),
            no_sandbox: args.no_sandbox,
            headless: args.headless,
        },
    };

    ChromeDriver::new(mode)
        .await
        .context("Failed to start Chrome")
}

async fn save_screenshot(driver: &ChromeDriver, dir: &Path, name: &str) {
    let path = dir.join(format!(
        "{}-{}.png",
        name,
        chrono::Utc::now().format("%Y%m%dT%H%M%S%3f")
    ));

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        log::warn!("Could not create {}: {}", dir.display(), e);
        return;
    }

    match driver.screenshot_to_file(&path).await {
        Ok(()) => log::info!("Saved screenshot {}", path.display()),
        Err(e) => log::warn!("Screenshot {} failed: {}", path.display(), e),
    }
}
