//! Field layout shared with the companion app.

use serde::{Deserialize, Serialize};

use crate::{
    message::Dictionary,
    model::{Coordinates, TEXT_BUFFER_SIZE, WeatherInfo, truncate_to},
    provider::ProviderId,
};

/// Numeric keys of every tuple in the schema.
///
/// The host assigns these at build time; the defaults follow declaration
/// order starting at 10000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageKeys {
    pub reply: u32,
    pub description: u32,
    pub name: u32,
    pub temp_k: u32,
    pub day: u32,
    pub condition: u32,
    pub request: u32,
    pub api_key: u32,
    pub provider: u32,
    pub latitude: u32,
    pub longitude: u32,
    pub bad_key: u32,
    pub location_unavailable: u32,
    pub sunrise: u32,
    pub sunset: u32,
    pub wind_direction: u32,
    pub wind_speed: u32,
    pub pressure: u32,
    pub humidity: u32,
    pub feels_like: u32,
}

impl Default for MessageKeys {
    fn default() -> Self {
        Self {
            reply: 10000,
            description: 10001,
            name: 10002,
            temp_k: 10003,
            day: 10004,
            condition: 10005,
            request: 10006,
            api_key: 10007,
            provider: 10008,
            latitude: 10009,
            longitude: 10010,
            bad_key: 10011,
            location_unavailable: 10012,
            sunrise: 10013,
            sunset: 10014,
            wind_direction: 10015,
            wind_speed: 10016,
            pressure: 10017,
            humidity: 10018,
            feels_like: 10019,
        }
    }
}

/// Everything the watch tells the companion when asking for weather.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherRequest {
    pub api_key: String,
    pub provider: Option<ProviderId>,
    pub location: Coordinates,
    pub feels_like: bool,
}

impl Default for WeatherRequest {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            provider: None,
            location: Coordinates::GPS,
            feels_like: false,
        }
    }
}

impl WeatherRequest {
    /// Builds the outbound dictionary; optional fields are left out when unset.
    pub fn to_dictionary(&self, keys: &MessageKeys) -> Dictionary {
        let mut out = Dictionary::new();
        out.write_u8(keys.request, 1);

        if !self.api_key.is_empty() {
            out.write_cstring(keys.api_key, &self.api_key);
        }

        if let Some(provider) = self.provider {
            out.write_i32(keys.provider, provider.code());
        }

        if self.location.is_explicit() {
            out.write_i32(keys.latitude, self.location.latitude);
            out.write_i32(keys.longitude, self.location.longitude);
        }

        if self.feels_like {
            out.write_i8(keys.feels_like, 1);
        }

        out
    }
}

/// Fields of a successful reply, before the watch stamps its own capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReply {
    pub description: String,
    pub name: String,
    pub temp_k: i32,
    pub day: bool,
    pub condition: i32,
    pub sunrise: i64,
    pub sunset: i64,
    pub wind_direction: i32,
    pub wind_speed: i32,
    pub pressure: i32,
    pub humidity: i32,
}

impl WeatherReply {
    pub fn into_info(self, timestamp: i64) -> WeatherInfo {
        let mut info = WeatherInfo {
            description: self.description,
            name: self.name,
            timestamp,
            day: self.day,
            condition: self.condition,
            sunrise: self.sunrise,
            sunset: self.sunset,
            wind_direction: self.wind_direction,
            wind_speed: self.wind_speed,
            pressure: self.pressure,
            humidity: self.humidity,
            ..Default::default()
        };
        info.set_kelvin(self.temp_k);
        info
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MalformedReply {
    #[error("reply is missing the `{0}` field")]
    Missing(&'static str),

    #[error("reply field `{field}` is not {expected}")]
    WrongKind {
        field: &'static str,
        expected: &'static str,
    },

    #[error("reply field `{field}` value {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },
}

/// The single outcome an inbound message stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Weather(WeatherReply),
    Malformed(MalformedReply),
    BadKey,
    LocationUnavailable,
}

impl Reply {
    /// Classifies an inbound message; `None` means it is not addressed to us.
    ///
    /// Error markers win over the weather reply marker, location first.
    pub fn classify(message: &Dictionary, keys: &MessageKeys) -> Option<Reply> {
        if message.contains(keys.location_unavailable) {
            return Some(Reply::LocationUnavailable);
        }
        if message.contains(keys.bad_key) {
            return Some(Reply::BadKey);
        }
        if message.contains(keys.reply) {
            return Some(match parse_weather(message, keys) {
                Ok(reply) => Reply::Weather(reply),
                Err(malformed) => Reply::Malformed(malformed),
            });
        }
        None
    }
}

fn parse_weather(message: &Dictionary, keys: &MessageKeys) -> Result<WeatherReply, MalformedReply> {
    let fields = Fields { message };

    Ok(WeatherReply {
        description: fields.text(keys.description, "description")?,
        name: fields.text(keys.name, "name")?,
        temp_k: fields.int16(keys.temp_k, "temp_k")?,
        day: fields.int(keys.day, "day")? == 1,
        condition: fields.int32(keys.condition, "condition")?,
        sunrise: fields.int(keys.sunrise, "sunrise")?,
        sunset: fields.int(keys.sunset, "sunset")?,
        wind_direction: fields.int32(keys.wind_direction, "wind_direction")?,
        wind_speed: fields.int32(keys.wind_speed, "wind_speed")?,
        pressure: fields.int32(keys.pressure, "pressure")?,
        humidity: fields.int32(keys.humidity, "humidity")?,
    })
}

struct Fields<'a> {
    message: &'a Dictionary,
}

impl Fields<'_> {
    fn text(&self, key: u32, field: &'static str) -> Result<String, MalformedReply> {
        let value = self.message.find(key).ok_or(MalformedReply::Missing(field))?;
        let s = value.as_str().ok_or(MalformedReply::WrongKind {
            field,
            expected: "text",
        })?;
        Ok(truncate_to(s, TEXT_BUFFER_SIZE - 1).to_owned())
    }

    fn int(&self, key: u32, field: &'static str) -> Result<i64, MalformedReply> {
        let value = self.message.find(key).ok_or(MalformedReply::Missing(field))?;
        value.as_int().ok_or(MalformedReply::WrongKind {
            field,
            expected: "an integer",
        })
    }

    fn int32(&self, key: u32, field: &'static str) -> Result<i32, MalformedReply> {
        let value = self.int(key, field)?;
        i32::try_from(value).map_err(|_| MalformedReply::OutOfRange { field, value })
    }

    /// Temperatures are 16-bit on the watch.
    fn int16(&self, key: u32, field: &'static str) -> Result<i32, MalformedReply> {
        let value = self.int(key, field)?;
        i16::try_from(value)
            .map(i32::from)
            .map_err(|_| MalformedReply::OutOfRange { field, value })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::message::TupleValue;

    /// A complete weather reply as the companion would send it.
    pub(crate) fn full_reply(keys: &MessageKeys) -> Dictionary {
        let mut d = Dictionary::new();
        d.write_i32(keys.reply, 1)
            .write_cstring(keys.description, "scattered clouds")
            .write_cstring(keys.name, "Reykjavik")
            .write_i32(keys.temp_k, 300)
            .write_i32(keys.day, 1)
            .write_i32(keys.condition, 802)
            .write_i32(keys.sunrise, 1_700_030_000)
            .write_i32(keys.sunset, 1_700_055_000)
            .write_i32(keys.wind_direction, 45)
            .write_i32(keys.wind_speed, 9)
            .write_i32(keys.pressure, 1008)
            .write_i32(keys.humidity, 66);
        d
    }

    fn field_keys(dict: &Dictionary) -> Vec<u32> {
        dict.iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn minimal_request_only_carries_marker() {
        let keys = MessageKeys::default();
        let dict = WeatherRequest::default().to_dictionary(&keys);

        assert_eq!(field_keys(&dict), vec![keys.request]);
        assert_eq!(dict.find(keys.request), Some(&TupleValue::UInt8(1)));
    }

    #[test]
    fn full_request_carries_every_field() {
        let keys = MessageKeys::default();
        let request = WeatherRequest {
            api_key: "abc123".into(),
            provider: Some(ProviderId::WeatherUnderground),
            location: Coordinates::new(5_150_000, -12_000),
            feels_like: true,
        };
        let dict = request.to_dictionary(&keys);

        assert_eq!(dict.find_cstring(keys.api_key), Some("abc123"));
        assert_eq!(dict.find(keys.provider), Some(&TupleValue::Int32(1)));
        assert_eq!(dict.find(keys.latitude), Some(&TupleValue::Int32(5_150_000)));
        assert_eq!(dict.find(keys.longitude), Some(&TupleValue::Int32(-12_000)));
        assert_eq!(dict.find(keys.feels_like), Some(&TupleValue::Int8(1)));
    }

    #[test]
    fn half_sentinel_location_is_not_sent() {
        let keys = MessageKeys::default();
        let request = WeatherRequest {
            location: Coordinates::new(100, Coordinates::SENTINEL),
            ..Default::default()
        };
        let dict = request.to_dictionary(&keys);

        assert!(!dict.contains(keys.latitude));
        assert!(!dict.contains(keys.longitude));
    }

    #[test]
    fn classify_full_reply() {
        let keys = MessageKeys::default();
        let Some(Reply::Weather(reply)) = Reply::classify(&full_reply(&keys), &keys) else {
            panic!("expected a weather reply");
        };

        assert_eq!(reply.description, "scattered clouds");
        assert_eq!(reply.name, "Reykjavik");
        assert_eq!(reply.temp_k, 300);
        assert!(reply.day);
        assert_eq!(reply.condition, 802);
        assert_eq!(reply.humidity, 66);

        let info = reply.into_info(42);
        assert_eq!((info.temp_c, info.temp_f, info.timestamp), (27, 80, 42));
    }

    #[test]
    fn day_flag_requires_exactly_one() {
        let keys = MessageKeys::default();
        let mut dict = full_reply(&keys);
        dict.write_i32(keys.day, 2);

        let Some(Reply::Weather(reply)) = Reply::classify(&dict, &keys) else {
            panic!("expected a weather reply");
        };
        assert!(!reply.day);
    }

    #[test]
    fn missing_field_is_malformed() {
        let keys = MessageKeys::default();
        let mut dict = Dictionary::new();
        dict.write_i32(keys.reply, 1).write_cstring(keys.description, "fog");

        assert_eq!(
            Reply::classify(&dict, &keys),
            Some(Reply::Malformed(MalformedReply::Missing("name")))
        );
    }

    #[test]
    fn wrong_kind_is_malformed() {
        let keys = MessageKeys::default();
        let mut dict = full_reply(&keys);
        dict.write_cstring(keys.temp_k, "hot");

        assert_eq!(
            Reply::classify(&dict, &keys),
            Some(Reply::Malformed(MalformedReply::WrongKind {
                field: "temp_k",
                expected: "an integer"
            }))
        );
    }

    #[test]
    fn out_of_range_is_malformed() {
        let keys = MessageKeys::default();
        let mut dict = full_reply(&keys);
        dict.insert(keys.pressure, TupleValue::UInt32(u32::MAX));

        assert!(matches!(
            Reply::classify(&dict, &keys),
            Some(Reply::Malformed(MalformedReply::OutOfRange {
                field: "pressure",
                ..
            }))
        ));
    }

    #[test]
    fn extreme_temperature_is_malformed() {
        let keys = MessageKeys::default();
        for kelvin in [i32::MAX, i32::MIN, i32::from(i16::MAX) + 1] {
            let mut dict = full_reply(&keys);
            dict.write_i32(keys.temp_k, kelvin);

            assert_eq!(
                Reply::classify(&dict, &keys),
                Some(Reply::Malformed(MalformedReply::OutOfRange {
                    field: "temp_k",
                    value: i64::from(kelvin)
                }))
            );
        }

        let mut dict = full_reply(&keys);
        dict.write_i32(keys.temp_k, i32::from(i16::MIN));
        assert!(matches!(Reply::classify(&dict, &keys), Some(Reply::Weather(_))));
    }

    #[test]
    fn sunrise_beyond_i32_is_accepted() {
        let keys = MessageKeys::default();
        let mut dict = full_reply(&keys);
        dict.insert(keys.sunrise, TupleValue::UInt32(3_000_000_000));

        let Some(Reply::Weather(reply)) = Reply::classify(&dict, &keys) else {
            panic!("expected a weather reply");
        };
        assert_eq!(reply.sunrise, 3_000_000_000);
    }

    #[test]
    fn error_markers_take_precedence() {
        let keys = MessageKeys::default();
        let mut dict = full_reply(&keys);
        dict.write_u8(keys.bad_key, 1);
        assert_eq!(Reply::classify(&dict, &keys), Some(Reply::BadKey));

        dict.write_u8(keys.location_unavailable, 1);
        assert_eq!(Reply::classify(&dict, &keys), Some(Reply::LocationUnavailable));
    }

    #[test]
    fn unrelated_message_is_ignored() {
        let keys = MessageKeys::default();
        let mut dict = Dictionary::new();
        dict.write_cstring(42, "settings");

        assert_eq!(Reply::classify(&dict, &keys), None);
    }

    #[test]
    fn long_text_is_truncated() {
        let keys = MessageKeys::default();
        let mut dict = full_reply(&keys);
        dict.write_cstring(keys.name, &"n".repeat(50));

        let Some(Reply::Weather(reply)) = Reply::classify(&dict, &keys) else {
            panic!("expected a weather reply");
        };
        assert_eq!(reply.name.len(), TEXT_BUFFER_SIZE - 1);
    }
}
