use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capacity of the text fields, terminating NUL included.
pub const TEXT_BUFFER_SIZE: usize = 32;

/// Size of the persisted record image produced by [`WeatherInfo::to_record`].
pub const RECORD_LEN: usize = TEXT_BUFFER_SIZE * 2 + 4 * 3 + 8 + 1 + 4 + 8 * 2 + 4 * 4;

/// Last weather report received from the companion app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherInfo {
    pub description: String,
    pub name: String,
    pub temp_k: i32,
    pub temp_c: i32,
    pub temp_f: i32,
    /// Unix seconds, taken from the watch clock when the reply arrived.
    pub timestamp: i64,
    pub day: bool,
    pub condition: i32,
    pub sunrise: i64,
    pub sunset: i64,
    pub wind_direction: i32,
    pub wind_speed: i32,
    pub pressure: i32,
    pub humidity: i32,
}

/// Kelvin to Celsius, integer offset of 273. Saturates at the `i32` bounds.
pub const fn kelvin_to_celsius(kelvin: i32) -> i32 {
    kelvin.saturating_sub(273)
}

/// Celsius to Fahrenheit using truncating integer division. Saturates at the `i32` bounds.
pub const fn celsius_to_fahrenheit(celsius: i32) -> i32 {
    celsius.saturating_mul(9) / 5 + 32
}

impl WeatherInfo {
    /// Sets all three temperature fields from a Kelvin reading.
    pub fn set_kelvin(&mut self, kelvin: i32) {
        self.temp_k = kelvin;
        self.temp_c = kelvin_to_celsius(kelvin);
        self.temp_f = celsius_to_fahrenheit(self.temp_c);
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    pub fn sunrise_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.sunrise, 0)
    }

    pub fn sunset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.sunset, 0)
    }

    /// Fixed-size little-endian image used for persistence.
    ///
    /// Text fields are NUL padded to [`TEXT_BUFFER_SIZE`]; longer text is cut
    /// on a char boundary so that at least one NUL remains.
    pub fn to_record(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        let mut w = RecordWriter { buf: &mut out, pos: 0 };

        w.text(&self.description);
        w.text(&self.name);
        w.bytes(&self.temp_k.to_le_bytes());
        w.bytes(&self.temp_c.to_le_bytes());
        w.bytes(&self.temp_f.to_le_bytes());
        w.bytes(&self.timestamp.to_le_bytes());
        w.bytes(&[u8::from(self.day)]);
        w.bytes(&self.condition.to_le_bytes());
        w.bytes(&self.sunrise.to_le_bytes());
        w.bytes(&self.sunset.to_le_bytes());
        w.bytes(&self.wind_direction.to_le_bytes());
        w.bytes(&self.wind_speed.to_le_bytes());
        w.bytes(&self.pressure.to_le_bytes());
        w.bytes(&self.humidity.to_le_bytes());

        out
    }

    /// Inverse of [`WeatherInfo::to_record`].
    pub fn from_record(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_LEN {
            return Err(RecordError::Length {
                expected: RECORD_LEN,
                actual: bytes.len(),
            });
        }

        let mut r = RecordReader { buf: bytes, pos: 0 };

        Ok(Self {
            description: r.text(),
            name: r.text(),
            temp_k: r.i32(),
            temp_c: r.i32(),
            temp_f: r.i32(),
            timestamp: r.i64(),
            day: r.u8() != 0,
            condition: r.i32(),
            sunrise: r.i64(),
            sunset: r.i64(),
            wind_direction: r.i32(),
            wind_speed: r.i32(),
            pressure: r.i32(),
            humidity: r.i32(),
        })
    }
}

/// Truncates `s` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_to(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

struct RecordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl RecordWriter<'_> {
    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn text(&mut self, s: &str) {
        let s = truncate_to(s, TEXT_BUFFER_SIZE - 1);
        self.buf[self.pos..self.pos + s.len()].copy_from_slice(s.as_bytes());
        self.pos += TEXT_BUFFER_SIZE;
    }
}

struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl RecordReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn text(&mut self) -> String {
        let raw: [u8; TEXT_BUFFER_SIZE] = self.take();
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record image is {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// Progress of the most recent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    NotYetFetched,
    Pending,
    Available,
    Failed,
    BadKey,
    LocationUnavailable,
    BluetoothDisconnected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotYetFetched => "not yet fetched",
            Status::Pending => "pending",
            Status::Available => "available",
            Status::Failed => "failed",
            Status::BadKey => "bad api key",
            Status::LocationUnavailable => "location unavailable",
            Status::BluetoothDisconnected => "bluetooth disconnected",
        }
    }

    /// `true` once a fetch has reached an outcome, successful or not.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Status::NotYetFetched | Status::Pending)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-point position, degrees scaled by [`Coordinates::SCALE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: i32,
    pub longitude: i32,
}

impl Coordinates {
    pub const SCALE: f64 = 100_000.0;

    /// All bits set; tells the companion to use the phone's own location.
    pub const SENTINEL: i32 = 0xFFFF_FFFFu32 as i32;

    pub const GPS: Coordinates = Coordinates {
        latitude: Self::SENTINEL,
        longitude: Self::SENTINEL,
    };

    pub const fn new(latitude: i32, longitude: i32) -> Self {
        Self { latitude, longitude }
    }

    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: (latitude * Self::SCALE).round() as i32,
            longitude: (longitude * Self::SCALE).round() as i32,
        }
    }

    /// Whether both components carry a real position and should be sent.
    pub fn is_explicit(&self) -> bool {
        self.latitude != Self::SENTINEL && self.longitude != Self::SENTINEL
    }

    pub fn to_degrees(&self) -> Option<(f64, f64)> {
        self.is_explicit().then(|| {
            (
                f64::from(self.latitude) / Self::SCALE,
                f64::from(self.longitude) / Self::SCALE,
            )
        })
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::GPS
    }
}
