// used for calendar conversions of dates
use chrono::{Datelike, NaiveDate};
// so regular expressions don't have to be recompiled
use lazy_static::lazy_static;
use regex::Regex;

// used to print out readable forms of a value
use std::fmt;

use crate::codec::{Codec, FieldReader, DEFAULT_CANDIDATES};
use crate::error::{ArborError, Result};
use crate::grid::Grid;

lazy_static! {
    static ref RE_DATE: Regex = Regex::new(r"^([0-9]{4})([0-9]{2})([0-9]{2})$").unwrap();
    static ref RE_NUMBER: Regex =
        Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$").unwrap();
}

/// Shortest text that could possibly be a grid code: delimiter, rows, cols,
/// one header, one label and one encoded cell.
pub const MIN_GRID_CODE_LEN: usize = 12;

pub const YEAR_RANGE: (u32, u32) = (1900, 2100);

// ------------- Kind --------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Unknown,
    String,
    Number,
    Date,
    Grid,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Unknown => "Unknown",
            Kind::String => "String",
            Kind::Number => "Number",
            Kind::Date => "Date",
            Kind::Grid => "Grid",
        }
    }
    /// The single letter naming this kind in both codec forms.
    pub fn letter(self) -> char {
        match self {
            Kind::Unknown => 'U',
            Kind::String => 'S',
            Kind::Number => 'N',
            Kind::Date => 'D',
            Kind::Grid => 'G',
        }
    }
    pub fn from_letter(letter: &str) -> Option<Kind> {
        match letter {
            "U" => Some(Kind::Unknown),
            "S" => Some(Kind::String),
            "N" => Some(Kind::Number),
            "D" => Some(Kind::Date),
            "G" => Some(Kind::Grid),
            _ => None,
        }
    }
}
impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ------------- Date --------------
/// A calendar date stored as the integer YYYYMMDD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(u32);

impl Date {
    /// Accepts any YYYYMMDD integer whose components are in
    /// [1900,2100] x [01,12] x [01,31]; calendar validity is not required.
    pub fn new(yyyymmdd: u32) -> Result<Self> {
        let date = Self(yyyymmdd);
        let (y, m, d) = (date.year(), date.month(), date.day());
        if (YEAR_RANGE.0..=YEAR_RANGE.1).contains(&y)
            && (1..=12).contains(&m)
            && (1..=31).contains(&d)
        {
            Ok(date)
        } else {
            Err(ArborError::InvalidArgument(format!(
                "{yyyymmdd} is not a YYYYMMDD date within {}-{}",
                YEAR_RANGE.0, YEAR_RANGE.1
            )))
        }
    }
    pub fn from_ymd(year: u32, month: u32, day: u32) -> Result<Self> {
        if year > 9999 || month > 99 || day > 99 {
            return Err(ArborError::InvalidArgument(format!(
                "{year}-{month}-{day} does not fit YYYYMMDD"
            )));
        }
        Self::new(year * 10_000 + month * 100 + day)
    }
    pub fn parse(text: &str) -> Result<Self> {
        let caps = RE_DATE.captures(text).ok_or_else(|| {
            ArborError::InvalidArgument(format!("{text:?} is not an 8 digit date"))
        })?;
        let component = |i: usize| {
            caps[i].parse::<u32>().map_err(|e| {
                ArborError::InvalidArgument(format!("{text:?} is not an 8 digit date: {e}"))
            })
        };
        Self::from_ymd(component(1)?, component(2)?, component(3)?)
    }
    pub fn yyyymmdd(&self) -> u32 {
        self.0
    }
    pub fn year(&self) -> u32 {
        self.0 / 10_000
    }
    pub fn month(&self) -> u32 {
        self.0 / 100 % 100
    }
    pub fn day(&self) -> u32 {
        self.0 % 100
    }
    /// `None` for dates like 20230231 that pass the range check but name no
    /// real day.
    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year() as i32, self.month(), self.day())
    }
}
impl TryFrom<NaiveDate> for Date {
    type Error = ArborError;
    fn try_from(d: NaiveDate) -> Result<Self> {
        let year = u32::try_from(d.year()).map_err(|_| {
            ArborError::InvalidArgument(format!("{d} lies before year 0"))
        })?;
        Self::from_ymd(year, d.month(), d.day())
    }
}
impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

// ------------- Value --------------
/// The atomic unit of the data model.
///
/// Owned payloads (strings and grids) are dropped automatically whenever a
/// setter re-tags the value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Unknown,
    String(String),
    Number(f64),
    Date(Date),
    Grid(Box<Grid>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Unknown => Kind::Unknown,
            Value::String(_) => Kind::String,
            Value::Number(_) => Kind::Number,
            Value::Date(_) => Kind::Date,
            Value::Grid(_) => Kind::Grid,
        }
    }
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }
    fn mismatch(&self, expected: Kind) -> ArborError {
        ArborError::TypeMismatch {
            expected: expected.name(),
            found: self.kind().name(),
        }
    }

    // setters
    pub fn set_unknown(&mut self) {
        *self = Value::Unknown;
    }
    pub fn set_string(&mut self, s: impl Into<String>) {
        *self = Value::String(s.into());
    }
    pub fn set_number(&mut self, n: f64) {
        *self = Value::Number(n);
    }
    pub fn set_date(&mut self, d: Date) {
        *self = Value::Date(d);
    }
    pub fn set_grid(&mut self, g: &Grid) {
        *self = Value::Grid(Box::new(g.clone()));
    }

    // getters
    pub fn get_string(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch(Kind::String)),
        }
    }
    pub fn get_number(&self) -> Result<f64> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(other.mismatch(Kind::Number)),
        }
    }
    pub fn get_date(&self) -> Result<Date> {
        match self {
            Value::Date(d) => Ok(*d),
            other => Err(other.mismatch(Kind::Date)),
        }
    }
    pub fn get_grid(&self) -> Result<&Grid> {
        match self {
            Value::Grid(g) => Ok(g),
            other => Err(other.mismatch(Kind::Grid)),
        }
    }
    pub fn get_grid_mut(&mut self) -> Result<&mut Grid> {
        match self {
            Value::Grid(g) => Ok(g),
            other => Err(other.mismatch(Kind::Grid)),
        }
    }

    /// Sets the value from text, either as an explicit kind or, given `None`,
    /// by inferring date, number, grid code and finally plain string.
    pub fn set_from_text(&mut self, kind: Option<Kind>, text: &str) -> Result<()> {
        *self = match kind {
            None => Self::infer(text),
            Some(Kind::Unknown) => Value::Unknown,
            Some(Kind::String) => Value::String(text.to_string()),
            Some(Kind::Number) => Value::Number(parse_number(text)?),
            Some(Kind::Date) => Value::Date(Date::parse(text)?),
            Some(Kind::Grid) => Value::Grid(Box::new(Grid::decode(text)?)),
        };
        Ok(())
    }
    pub fn from_text(kind: Option<Kind>, text: &str) -> Result<Self> {
        let mut value = Value::Unknown;
        value.set_from_text(kind, text)?;
        Ok(value)
    }
    fn infer(text: &str) -> Value {
        if let Ok(date) = Date::parse(text) {
            return Value::Date(date);
        }
        if let Ok(number) = parse_number(text) {
            return Value::Number(number);
        }
        if looks_like_grid_code(text) {
            if let Ok(grid) = Grid::decode(text) {
                return Value::Grid(Box::new(grid));
            }
        }
        Value::String(text.to_string())
    }

    /// The payload on its own, as it appears in both codec forms.
    fn payload(&self, codec: &Codec) -> Result<String> {
        Ok(match self {
            Value::Unknown => String::new(),
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Date(d) => d.to_string(),
            Value::Grid(g) => g.encode_with(codec)?,
        })
    }
    fn from_payload(kind: Kind, payload: &str) -> Result<Self> {
        let malformed = |e: ArborError| ArborError::Codec(format!("bad {kind} payload: {e}"));
        Ok(match kind {
            Kind::Unknown if payload.is_empty() => Value::Unknown,
            Kind::Unknown => {
                return Err(ArborError::Codec(format!(
                    "Unknown value carries a payload: {payload:?}"
                )));
            }
            Kind::String => Value::String(payload.to_string()),
            Kind::Number => Value::Number(payload.parse::<f64>().map_err(|_| {
                ArborError::Codec(format!("bad Number payload: {payload:?}"))
            })?),
            Kind::Date => Value::Date(Date::parse(payload).map_err(malformed)?),
            Kind::Grid => Value::Grid(Box::new(Grid::decode(payload)?)),
        })
    }

    pub fn encode(&self) -> Result<String> {
        self.encode_with(&Codec::default())
    }
    pub fn encode_with(&self, codec: &Codec) -> Result<String> {
        let payload = self.payload(codec)?;
        let mut writer = codec.writer();
        writer.push_display(self.kind().letter()).push(&payload);
        writer.finish()
    }
    pub fn decode(text: &str) -> Result<Self> {
        let mut reader = FieldReader::open(text)?;
        let value = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
    fn read(reader: &mut FieldReader) -> Result<Self> {
        let letter = reader.next("kind letter")?;
        let kind = Kind::from_letter(letter)
            .ok_or_else(|| ArborError::Codec(format!("unknown kind letter {letter:?}")))?;
        Self::from_payload(kind, reader.next("payload")?)
    }

    /// The flat `K:payload` form, e.g. `N:55.6` or `D:20240131`.
    pub fn to_tagged_text(&self) -> Result<String> {
        Ok(format!(
            "{}:{}",
            self.kind().letter(),
            self.payload(&Codec::default())?
        ))
    }
    pub fn from_tagged_text(text: &str) -> Result<Self> {
        let (letter, payload) = text
            .split_once(':')
            .ok_or_else(|| ArborError::Codec(format!("missing kind prefix in {text:?}")))?;
        let kind = Kind::from_letter(letter)
            .ok_or_else(|| ArborError::Codec(format!("unknown kind letter {letter:?}")))?;
        Self::from_payload(kind, payload)
    }

    /// Calls `f` on every non-grid value, descending into grid cells at any
    /// depth.
    pub fn apply<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Value) -> Result<()>,
    {
        match self {
            Value::Grid(g) => g.for_each_cell_mut(|cell| cell.apply(&mut *f)),
            scalar => f(scalar),
        }
    }
    /// Replaces every number reachable from this value with `f(number)`.
    pub fn map_numbers<F: FnMut(f64) -> f64>(&mut self, mut f: F) -> Result<()> {
        self.apply(&mut |v: &mut Value| {
            if let Value::Number(n) = v {
                *n = f(*n);
            }
            Ok(())
        })
    }
}

fn parse_number(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    if !RE_NUMBER.is_match(trimmed) {
        return Err(ArborError::InvalidArgument(format!(
            "{text:?} is not a decimal number"
        )));
    }
    trimmed
        .parse::<f64>()
        .map_err(|e| ArborError::InvalidArgument(format!("{text:?}: {e}")))
}

fn looks_like_grid_code(text: &str) -> bool {
    let bytes = text.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() >= MIN_GRID_CODE_LEN
                && first == last
                && DEFAULT_CANDIDATES.contains(first)
        }
        _ => false,
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Value::Date(d)
    }
}
impl From<Grid> for Value {
    fn from(g: Grid) -> Self {
        Value::Grid(Box::new(g))
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Unknown => write!(f, "?"),
            Value::String(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d),
            Value::Grid(g) => write!(f, "<grid {}x{}>", g.rows(), g.cols()),
        }
    }
}
