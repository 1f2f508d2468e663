use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Wire code the companion app treats as "no provider selected".
pub const UNKNOWN_PROVIDER_CODE: i32 = 1000;

/// Weather data source the companion app should query.
///
/// The "unknown" selection is `Option::<ProviderId>::None` everywhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenWeatherMap,
    WeatherUnderground,
    ForecastIo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "openweathermap",
            ProviderId::WeatherUnderground => "weatherunderground",
            ProviderId::ForecastIo => "forecastio",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenWeatherMap,
            ProviderId::WeatherUnderground,
            ProviderId::ForecastIo,
        ]
    }

    /// Integer sent in the `provider` tuple.
    pub const fn code(&self) -> i32 {
        match self {
            ProviderId::OpenWeatherMap => 0,
            ProviderId::WeatherUnderground => 1,
            ProviderId::ForecastIo => 2,
        }
    }

    /// Inverse of [`ProviderId::code`]; the unknown sentinel and anything else map to `None`.
    pub fn from_code(code: i32) -> Option<ProviderId> {
        Self::all().iter().copied().find(|id| id.code() == code)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweathermap" | "openweather" | "owm" => Ok(ProviderId::OpenWeatherMap),
            "weatherunderground" | "wunderground" => Ok(ProviderId::WeatherUnderground),
            "forecastio" | "darksky" => Ok(ProviderId::ForecastIo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. \
                 Supported providers: openweathermap, weatherunderground, forecastio."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!(
            ProviderId::try_from("OpenWeatherMap").unwrap(),
            ProviderId::OpenWeatherMap
        );
        assert_eq!(ProviderId::try_from("DarkSky").unwrap(), ProviderId::ForecastIo);
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn wire_codes_match_companion_schema() {
        assert_eq!(ProviderId::OpenWeatherMap.code(), 0);
        assert_eq!(ProviderId::WeatherUnderground.code(), 1);
        assert_eq!(ProviderId::ForecastIo.code(), 2);
        assert_eq!(ProviderId::from_code(2), Some(ProviderId::ForecastIo));
        assert_eq!(ProviderId::from_code(UNKNOWN_PROVIDER_CODE), None);
    }
}
