//! Shop backend daemon: loads the config, opens the JSON stores, builds the
//! RCON channel, runs the maintenance loop (session expiry, limiter GC,
//! interval rewards) and serves the line protocol.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use point_shop::{
    now_unix_ms, PointShop, RewardConfig, ShopConfig, ShopServer, ShopServerConfig,
};
use point_shop_rcon::RconClient;

const DEFAULT_CONFIG_PATH: &str = "point_shop.toml";

const MAINTENANCE_TICK: Duration = Duration::from_secs(1);
const LIMITER_GC_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    data_dir: Option<PathBuf>,
    bind_addr: Option<String>,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            data_dir: None,
            bind_addr: None,
        }
    }
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => options.config_path = PathBuf::from(next_value(&mut args, "--config")?),
            "--data-dir" => {
                options.data_dir = Some(PathBuf::from(next_value(&mut args, "--data-dir")?))
            }
            "--bind" => options.bind_addr = Some(next_value(&mut args, "--bind")?),
            other => return Err(format!("unknown option: {other}")),
        }
    }
    Ok(options)
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} requires a value"))
}

fn load_config(options: &CliOptions) -> Result<ShopConfig, String> {
    let mut config = if options.config_path.exists() {
        ShopConfig::load_toml(&options.config_path).map_err(|err| {
            format!(
                "load config {} failed: {err:?}",
                options.config_path.display()
            )
        })?
    } else {
        eprintln!(
            "config {} not found, using defaults",
            options.config_path.display()
        );
        ShopConfig::default()
    };
    if let Some(data_dir) = &options.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(bind_addr) = &options.bind_addr {
        config.bind_addr = bind_addr.clone();
    }
    Ok(config)
}

fn spawn_maintenance(shop: Arc<PointShop>, reward: RewardConfig) {
    thread::spawn(move || {
        let reward_interval =
            Duration::from_secs(reward.interval_minutes.saturating_mul(60).max(60));
        let mut last_reward = Instant::now();
        let mut last_gc = Instant::now();
        loop {
            thread::sleep(MAINTENANCE_TICK);
            let now_ms = now_unix_ms();
            shop.expire_sessions(now_ms);
            if last_gc.elapsed() >= LIMITER_GC_INTERVAL {
                if let Err(err) = shop.limiter().gc(now_ms) {
                    eprintln!("retry limiter gc failed: {err:?}");
                }
                last_gc = Instant::now();
            }
            if reward.points > 0 && last_reward.elapsed() >= reward_interval {
                let report = shop.reward_sweep(reward.points, now_ms);
                eprintln!(
                    "interval reward sweep credited {} players ({} failed)",
                    report.credited, report.failed
                );
                last_reward = Instant::now();
            }
        }
    });
}

fn main() {
    let options = match parse_options(env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("usage: point_shop_server [--config PATH] [--data-dir DIR] [--bind ADDR]");
            process::exit(2);
        }
    };
    let config = match load_config(&options) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let channel = Arc::new(RconClient::new(config.rcon.clone()));
    let shop = match PointShop::open(&config, channel) {
        Ok(shop) => Arc::new(shop),
        Err(err) => {
            eprintln!("open shop state in {} failed: {err:?}", config.data_dir.display());
            process::exit(1);
        }
    };

    spawn_maintenance(shop.clone(), config.reward.clone());

    eprintln!("point_shop_server listening on {}", config.bind_addr);
    let server = ShopServer::new(ShopServerConfig::from_shop_config(&config), shop);
    if let Err(err) = server.run() {
        eprintln!("server failed: {err:?}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_options, DEFAULT_CONFIG_PATH};
    use std::path::PathBuf;

    fn args<'a>(values: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        values.iter().map(|value| value.to_string())
    }

    #[test]
    fn parse_options_defaults() {
        let options = parse_options(std::iter::empty()).expect("parse should succeed");
        assert_eq!(options.config_path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(options.data_dir, None);
        assert_eq!(options.bind_addr, None);
    }

    #[test]
    fn parse_options_overrides() {
        let options = parse_options(args(&[
            "--config",
            "/etc/shop.toml",
            "--data-dir",
            "/var/lib/shop",
            "--bind",
            "0.0.0.0:7000",
        ]))
        .expect("parse should succeed");
        assert_eq!(options.config_path, PathBuf::from("/etc/shop.toml"));
        assert_eq!(options.data_dir, Some(PathBuf::from("/var/lib/shop")));
        assert_eq!(options.bind_addr, Some("0.0.0.0:7000".to_string()));
    }

    #[test]
    fn parse_options_rejects_unknown_flags() {
        let err = parse_options(args(&["--verbose"])).expect_err("expected rejection");
        assert_eq!(err, "unknown option: --verbose");
        let err = parse_options(args(&["--config"])).expect_err("expected missing value");
        assert_eq!(err, "--config requires a value");
    }
}
