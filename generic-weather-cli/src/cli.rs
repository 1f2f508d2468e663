use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use generic_weather_core::{
    Config, LocationConfig, ProviderId, Status, WeatherInfo, WeatherSession,
    platform::{
        Storage,
        file::FileStorage,
        memory::{MemoryPlatform, MemoryStorage},
    },
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "generic-weather",
    version,
    about = "Drive a watch weather session from the command line"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweathermap" or "forecastio".
        provider: String,
    },

    /// Set a fixed location, or go back to the phone's GPS.
    Location {
        #[arg(long, allow_hyphen_values = true, requires = "lon", conflicts_with = "gps")]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,

        #[arg(long)]
        gps: bool,
    },

    /// Ask the companion for the "feels like" temperature instead of the measured one.
    FeelsLike {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Print the hex image of the request a watch would send.
    Request,

    /// Feed a hex-encoded companion message through a session.
    Receive {
        payload: String,

        /// Persist the resulting record under this storage key.
        #[arg(long)]
        save: Option<u32>,
    },

    /// Print a record previously stored with `receive --save`.
    Show { key: u32 },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Location { lat, lon, gps } => set_location(lat, lon, gps),
            Command::FeelsLike { enabled } => {
                let mut cfg = Config::load()?;
                cfg.feels_like = enabled;
                cfg.save()?;
                let state = if enabled { "enabled" } else { "disabled" };
                println!("Feels-like temperature {state}.");
                Ok(())
            }
            Command::Request => request(),
            Command::Receive { payload, save } => receive(&payload, save),
            Command::Show { key } => show(key),
        }
    }
}

fn configure(provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut cfg = Config::load()?;

    let api_key = inquire::Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .with_help_message("Leave empty to let the companion app use its own key")
        .prompt()
        .context("Failed to read API key")?;

    cfg.upsert_provider_api_key(id, api_key);
    cfg.save()?;

    println!("Saved credentials for {id} to {}", Config::config_file_path()?.display());
    Ok(())
}

fn set_location(lat: Option<f64>, lon: Option<f64>, gps: bool) -> Result<()> {
    let mut cfg = Config::load()?;

    cfg.location = match (lat, lon, gps) {
        (_, _, true) => None,
        (Some(latitude), Some(longitude), false) => {
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                bail!("Coordinates out of range: {latitude}, {longitude}");
            }
            Some(LocationConfig { latitude, longitude })
        }
        _ => bail!("Pass --lat and --lon together, or --gps"),
    };
    cfg.save()?;

    match cfg.location {
        Some(loc) => println!("Location set to {}, {}", loc.latitude, loc.longitude),
        None => println!("Location set to phone GPS"),
    }
    Ok(())
}

/// Connected in-memory host whose records persist into `storage`.
fn session<S: Storage>(cfg: &Config, storage: S) -> Result<WeatherSession<MemoryPlatform<S>>> {
    let platform = MemoryPlatform::connected().with_storage(storage);
    let mut session = WeatherSession::new(platform, cfg.session_options());
    session.init();
    cfg.apply(&mut session)?;
    Ok(session)
}

fn request() -> Result<()> {
    let cfg = Config::load()?;
    let mut session = session(&cfg, MemoryStorage::default())?;

    session.fetch().context("Failed to build weather request")?;
    let payload = session
        .platform_mut()
        .take_sent()
        .pop()
        .ok_or_else(|| anyhow!("Session did not send a request"))?;

    tracing::debug!(status = %session.status(), "request built");
    println!("{}", hex::encode(payload));
    Ok(())
}

fn receive(payload: &str, save: Option<u32>) -> Result<()> {
    let cfg = Config::load()?;
    let bytes = hex::decode(payload.trim()).context("Payload is not valid hex")?;

    let storage = FileStorage::open_default()?;
    let dir = storage.dir().to_path_buf();
    let mut session = session(&cfg, storage)?;
    // a request must be outstanding for the reply to resolve a fetch
    let mut handle = session.fetch()?;

    let status = session
        .handle_payload(&bytes)
        .context("Failed to decode companion message")?;

    let Some(status) = status else {
        println!("Message is not a weather reply; ignored.");
        return Ok(());
    };

    println!("Status: {status}");
    match handle.try_outcome() {
        Some(Ok(info)) => print_info(&info)?,
        Some(Err(e)) => println!("{e}"),
        None => {}
    }

    if let Some(key) = save {
        if status != Status::Available {
            bail!("Nothing to save: reply status is {status}");
        }
        session
            .save(key)
            .with_context(|| format!("Failed to save record {key}"))?;
        println!("Saved record under key {key} in {}", dir.display());
    }

    Ok(())
}

fn show(key: u32) -> Result<()> {
    let cfg = Config::load()?;
    let mut session = session(&cfg, FileStorage::open_default()?)?;

    let found = session
        .load(key)
        .with_context(|| format!("Record {key} is not a weather record"))?;
    if !found {
        bail!("No record stored under key {key}");
    }
    let info = session
        .peek()
        .ok_or_else(|| anyhow!("Session has no weather record"))?;
    print_info(info)
}

fn print_info(info: &WeatherInfo) -> Result<()> {
    let json =
        serde_json::to_string_pretty(info).context("Failed to serialize weather record")?;
    println!("{json}");

    if let Some(at) = info.captured_at() {
        println!("Captured {}", at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "generic-weather", "location", "--lat", "-33.9", "--lon", "18.4",
        ])
        .unwrap();
        match cli.command {
            Command::Location { lat, lon, gps } => {
                assert_eq!(lat, Some(-33.9));
                assert_eq!(lon, Some(18.4));
                assert!(!gps);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn lat_requires_lon() {
        assert!(Cli::try_parse_from(["generic-weather", "location", "--lat", "1"]).is_err());
    }

    #[test]
    fn gps_conflicts_with_coordinates() {
        let res = Cli::try_parse_from([
            "generic-weather", "location", "--gps", "--lat", "1", "--lon", "2",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn feels_like_takes_a_bool() {
        let cli = Cli::try_parse_from(["generic-weather", "feels-like", "true"]).unwrap();
        assert!(matches!(cli.command, Command::FeelsLike { enabled: true }));
    }

    #[test]
    fn saved_record_shows_through_a_file_backed_session() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::default();
        let info = WeatherInfo {
            name: "Cape Town".into(),
            sunrise: 3_000_000_000,
            ..WeatherInfo::default()
        };

        let mut writer = session(&cfg, FileStorage::new(dir.path())).unwrap();
        assert!(!writer.load(7).unwrap());
        writer
            .platform_mut()
            .storage_mut()
            .write(7, &info.to_record())
            .unwrap();

        let mut reader = session(&cfg, FileStorage::new(dir.path())).unwrap();
        assert!(reader.load(7).unwrap());
        assert_eq!(reader.peek(), Some(&info));
        reader.save(8).unwrap();
        assert!(dir.path().join("8.bin").exists());
    }

    #[test]
    fn receive_accepts_save_key() {
        let cli = Cli::try_parse_from(["generic-weather", "receive", "00", "--save", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Receive { save: Some(3), .. }));
    }
}
