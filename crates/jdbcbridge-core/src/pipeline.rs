//! Type pipelines and the type registry.
//!
//! A [`TypePipeline`] converts between native values and one semantic
//! [`ValueType`]. The [`TypeRegistry`] maps three kinds of key onto pipelines:
//! the semantic type, its uppercase name, and every native type identifier
//! the pipeline accepts. JDBC type codes resolve through the JDBC type table
//! to a semantic type and from there to its pipeline.
//!
//! Pipelines are not instantiated when they are declared. Their factories are
//! queued with [`TypeRegistry::enqueue`] and only turned into pipelines when
//! the native runtime signals readiness through [`TypeRegistry::initialize`],
//! which runs once. Insertion is first-writer-wins: registering a key that is
//! already present leaves the existing pipeline in place.

use crate::error::{Error, Result};
use crate::native::{NativeType, NativeValue};
use crate::types::{JDBC_TYPES, JdbcType, codes, jdbc_type};
use crate::value::{Value, ValueType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Paired decode/encode functions for one semantic type.
pub trait TypePipeline: fmt::Debug + Send + Sync {
    /// The semantic type this pipeline produces.
    fn value_type(&self) -> ValueType;

    /// Registry name; defaults to the semantic type's name.
    fn name(&self) -> &str {
        self.value_type().name()
    }

    /// Native type identifiers routed to this pipeline.
    fn native_types(&self) -> &'static [NativeType];

    /// Native to language.
    fn decode(&self, native: NativeValue) -> Result<Value>;

    /// Language to native.
    fn encode(&self, value: &Value) -> Result<NativeValue>;
}

/// Deferred pipeline constructor.
pub type PipelineFactory = Box<dyn FnOnce() -> Arc<dyn TypePipeline> + Send>;

/// Key used to resolve a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineKey {
    /// Semantic (language) type
    Type(ValueType),
    /// Uppercased name
    Name(String),
    /// Native type identifier
    Native(NativeType),
    /// `java.sql.Types` code, resolved through the JDBC type table
    TypeCode(i32),
}

impl PipelineKey {
    pub fn name(name: &str) -> Self {
        PipelineKey::Name(name.trim().to_ascii_uppercase())
    }
}

impl From<ValueType> for PipelineKey {
    fn from(t: ValueType) -> Self {
        PipelineKey::Type(t)
    }
}

impl From<NativeType> for PipelineKey {
    fn from(t: NativeType) -> Self {
        PipelineKey::Native(t)
    }
}

impl From<&str> for PipelineKey {
    fn from(name: &str) -> Self {
        PipelineKey::name(name)
    }
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKey::Type(t) => write!(f, "type {}", t),
            PipelineKey::Name(n) => write!(f, "name '{}'", n),
            PipelineKey::Native(n) => write!(f, "native type {}", n),
            PipelineKey::TypeCode(c) => write!(f, "type code {}", c),
        }
    }
}

#[derive(Default)]
struct Pending {
    ready: bool,
    queue: Vec<PipelineFactory>,
}

/// Registry of type pipelines.
pub struct TypeRegistry {
    pipelines: RwLock<HashMap<PipelineKey, Arc<dyn TypePipeline>>>,
    sql_types: RwLock<HashMap<i32, JdbcType>>,
    type_codes: RwLock<HashMap<String, i32>>,
    pending: Mutex<Pending>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("ready", &self.is_ready())
            .field("pipelines", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// An empty registry with nothing queued.
    pub fn new() -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            sql_types: RwLock::new(HashMap::new()),
            type_codes: RwLock::new(HashMap::new()),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// A registry with the standard JDBC types registered and the built-in
    /// pipelines queued for [`initialize`](Self::initialize).
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for sql_type in JDBC_TYPES {
            registry.register_sql_type(*sql_type);
        }
        for factory in builtin_factories() {
            registry.enqueue(factory);
        }
        registry
    }

    /// Queue a pipeline factory.
    ///
    /// Once the registry is ready the factory is instantiated immediately.
    pub fn enqueue(&self, factory: PipelineFactory) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.ready {
            drop(pending);
            self.register(factory());
        } else {
            pending.queue.push(factory);
        }
    }

    /// Instantiate every queued pipeline. Only the first call does anything.
    ///
    /// Returns `true` if this call performed the initialization.
    pub fn initialize(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.ready {
            return false;
        }
        pending.ready = true;
        let queue = std::mem::take(&mut pending.queue);
        let count = queue.len();
        for factory in queue {
            self.register(factory());
        }
        tracing::debug!(pipelines = count, "type registry initialized");
        true
    }

    /// Whether [`initialize`](Self::initialize) has run.
    pub fn is_ready(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready
    }

    /// Register a pipeline under its type, name and native types.
    ///
    /// Returns `true` if the semantic type key was not registered before.
    pub fn register(&self, pipeline: Arc<dyn TypePipeline>) -> bool {
        let mut map = self
            .pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let fresh = !map.contains_key(&PipelineKey::Type(pipeline.value_type()));
        map.entry(PipelineKey::Type(pipeline.value_type()))
            .or_insert_with(|| Arc::clone(&pipeline));
        map.entry(PipelineKey::name(pipeline.name()))
            .or_insert_with(|| Arc::clone(&pipeline));
        for native in pipeline.native_types() {
            map.entry(PipelineKey::Native(*native))
                .or_insert_with(|| Arc::clone(&pipeline));
        }
        fresh
    }

    /// Register a JDBC type and its name.
    pub fn register_sql_type(&self, sql_type: JdbcType) {
        self.sql_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(sql_type.code)
            .or_insert(sql_type);
        self.type_codes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(sql_type.name.to_string())
            .or_insert(sql_type.code);
    }

    /// Look up a registered JDBC type by code.
    pub fn sql_type(&self, code: i32) -> Option<JdbcType> {
        self.sql_types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .copied()
    }

    /// Look up a registered JDBC type code by name.
    pub fn type_code(&self, name: &str) -> Option<i32> {
        self.type_codes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.trim().to_ascii_uppercase())
            .copied()
    }

    /// Number of distinct keys registered.
    pub fn len(&self) -> usize {
        self.pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a key to its pipeline.
    #[allow(clippy::result_large_err)]
    pub fn resolve(&self, key: impl Into<PipelineKey>) -> Result<Arc<dyn TypePipeline>> {
        let key = match key.into() {
            PipelineKey::TypeCode(code) => {
                let sql_type = self
                    .sql_type(code)
                    .or_else(|| jdbc_type(code).copied())
                    .ok_or_else(|| Error::lookup(PipelineKey::TypeCode(code)))?;
                PipelineKey::Type(sql_type.value_type)
            }
            PipelineKey::Name(name) => PipelineKey::name(&name),
            other => other,
        };
        self.pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::lookup(&key))
    }

    /// Encode a language value with the pipeline for its semantic type.
    #[allow(clippy::result_large_err)]
    pub fn encode(&self, value: &Value) -> Result<NativeValue> {
        self.resolve(value.value_type())?.encode(value)
    }

    /// Decode a native value with the pipeline for its native type.
    #[allow(clippy::result_large_err)]
    pub fn decode(&self, native: NativeValue) -> Result<Value> {
        self.resolve(native.native_type())?.decode(native)
    }

    /// Decode a result-set value described by `type_code`.
    ///
    /// The column's declared pipeline is tried first. When the code is not
    /// specific (NULL, OTHER, unknown) or the pipeline rejects the value, the
    /// native value's own type picks the pipeline.
    #[allow(clippy::result_large_err)]
    pub fn decode_column(&self, type_code: i32, native: NativeValue) -> Result<Value> {
        if native.is_null() {
            return Ok(Value::Null);
        }
        if type_code != codes::NULL && type_code != codes::OTHER {
            if let Ok(pipeline) = self.resolve(PipelineKey::TypeCode(type_code)) {
                if pipeline.value_type() != ValueType::Object {
                    if let Ok(value) = pipeline.decode(native.clone()) {
                        return Ok(value);
                    }
                }
            }
        }
        self.decode(native)
    }
}

fn builtin_factories() -> Vec<PipelineFactory> {
    vec![
        Box::new(|| Arc::new(ObjectPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(NullPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(BoolPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(TextPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(BytesPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(IntPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(FloatPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(DatePipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(TimePipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(TimestampPipeline) as Arc<dyn TypePipeline>),
        Box::new(|| Arc::new(DecimalPipeline) as Arc<dyn TypePipeline>),
    ]
}

fn reject(pipeline: ValueType, native: &NativeValue) -> Error {
    Error::data(format!(
        "cannot decode native {} as {}",
        native.native_type(),
        pipeline
    ))
}

fn mismatch(pipeline: ValueType, value: &Value) -> Error {
    Error::data(format!(
        "{} pipeline cannot encode a {} value",
        pipeline,
        value.type_name()
    ))
}

/// Language value of a wrapped native object, if it exposes one.
fn object_value(native: &NativeValue) -> Option<Value> {
    match native {
        NativeValue::Object(obj) => obj.as_native_decode().map(|d| d.to_value()),
        _ => None,
    }
}

/// Passthrough for native objects without a language representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectPipeline;

impl TypePipeline for ObjectPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Object
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Object]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        if let Some(value) = object_value(&native) {
            return Ok(value);
        }
        match native {
            NativeValue::Object(obj) => Ok(Value::Object(obj)),
            other => Err(reject(ValueType::Object, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Object(obj) => Ok(NativeValue::Object(Arc::clone(obj))),
            other => Err(mismatch(ValueType::Object, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullPipeline;

impl TypePipeline for NullPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Null
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Null]
    }

    fn decode(&self, _native: NativeValue) -> Result<Value> {
        Ok(Value::Null)
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Null => Ok(NativeValue::Null),
            other => Err(mismatch(ValueType::Null, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolPipeline;

impl TypePipeline for BoolPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Bool
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Boolean]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        if let Some(value) = object_value(&native) {
            return Ok(value);
        }
        match native {
            NativeValue::Boolean(b) => Ok(Value::Bool(b)),
            NativeValue::Byte(n) => Ok(Value::Bool(n != 0)),
            NativeValue::Short(n) => Ok(Value::Bool(n != 0)),
            NativeValue::Int(n) => Ok(Value::Bool(n != 0)),
            NativeValue::Long(n) => Ok(Value::Bool(n != 0)),
            NativeValue::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Value::Bool(true)),
                "false" | "f" | "0" => Ok(Value::Bool(false)),
                _ => Err(reject(ValueType::Bool, &native)),
            },
            other => Err(reject(ValueType::Bool, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Bool(b) => Ok(NativeValue::Boolean(*b)),
            other => Err(mismatch(ValueType::Bool, other)),
        }
    }
}

/// Strings, including character and large-text native types.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPipeline;

impl TypePipeline for TextPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Text
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::String, NativeType::Char, NativeType::Clob]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        match native {
            NativeValue::String(s) | NativeValue::Clob(s) => Ok(Value::Text(s)),
            NativeValue::Char(c) => Ok(Value::Text(c.to_string())),
            NativeValue::Boolean(b) => Ok(Value::Text(b.to_string())),
            NativeValue::Byte(n) => Ok(Value::Text(n.to_string())),
            NativeValue::Short(n) => Ok(Value::Text(n.to_string())),
            NativeValue::Int(n) => Ok(Value::Text(n.to_string())),
            NativeValue::Long(n) => Ok(Value::Text(n.to_string())),
            NativeValue::Float(n) => Ok(Value::Text(n.to_string())),
            NativeValue::Double(n) => Ok(Value::Text(n.to_string())),
            NativeValue::BigDecimal(d) => Ok(Value::Text(d.to_string())),
            other => Err(reject(ValueType::Text, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Text(s) => Ok(NativeValue::String(s.clone())),
            other => Err(mismatch(ValueType::Text, other)),
        }
    }
}

/// Binary data, including large-binary native types.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesPipeline;

impl TypePipeline for BytesPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Bytes
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Bytes, NativeType::Blob]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        match native {
            NativeValue::Bytes(b) | NativeValue::Blob(b) => Ok(Value::Bytes(b)),
            other => Err(reject(ValueType::Bytes, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Bytes(b) => Ok(NativeValue::Bytes(b.clone())),
            other => Err(mismatch(ValueType::Bytes, other)),
        }
    }
}

/// Short, int and long collapse into one 64-bit integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntPipeline;

impl TypePipeline for IntPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Int
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[
            NativeType::Byte,
            NativeType::Short,
            NativeType::Int,
            NativeType::Long,
        ]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        match native {
            NativeValue::Byte(n) => Ok(Value::Int(i64::from(n))),
            NativeValue::Short(n) => Ok(Value::Int(i64::from(n))),
            NativeValue::Int(n) => Ok(Value::Int(i64::from(n))),
            NativeValue::Long(n) => Ok(Value::Int(n)),
            NativeValue::Boolean(b) => Ok(Value::Int(i64::from(b))),
            NativeValue::BigDecimal(d) if d.fract().is_zero() => d
                .to_i64()
                .map(Value::Int)
                .ok_or_else(|| reject(ValueType::Int, &native)),
            NativeValue::Double(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Ok(Value::Int(f as i64))
            }
            NativeValue::String(ref s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| reject(ValueType::Int, &native)),
            other => Err(reject(ValueType::Int, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Int(n) => Ok(NativeValue::Long(*n)),
            other => Err(mismatch(ValueType::Int, other)),
        }
    }
}

/// Float and double collapse into one floating type.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatPipeline;

impl TypePipeline for FloatPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Float
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Float, NativeType::Double]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        match native {
            NativeValue::Float(f) => Ok(Value::Float(f64::from(f))),
            NativeValue::Double(f) => Ok(Value::Float(f)),
            NativeValue::Byte(n) => Ok(Value::Float(f64::from(n))),
            NativeValue::Short(n) => Ok(Value::Float(f64::from(n))),
            NativeValue::Int(n) => Ok(Value::Float(f64::from(n))),
            NativeValue::Long(n) => Ok(Value::Float(n as f64)),
            NativeValue::BigDecimal(d) => d
                .to_f64()
                .map(Value::Float)
                .ok_or_else(|| reject(ValueType::Float, &native)),
            NativeValue::String(ref s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| reject(ValueType::Float, &native)),
            other => Err(reject(ValueType::Float, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Float(f) => Ok(NativeValue::Double(*f)),
            other => Err(mismatch(ValueType::Float, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DatePipeline;

impl TypePipeline for DatePipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Date
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Date]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        if let Some(value) = object_value(&native) {
            return Ok(value);
        }
        match native {
            NativeValue::Date(d) => Ok(Value::Date(d)),
            NativeValue::String(ref s) => parse_date(s)
                .map(Value::Date)
                .ok_or_else(|| reject(ValueType::Date, &native)),
            other => Err(reject(ValueType::Date, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Date(d) => Ok(NativeValue::Date(*d)),
            other => Err(mismatch(ValueType::Date, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimePipeline;

impl TypePipeline for TimePipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Time
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Time]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        if let Some(value) = object_value(&native) {
            return Ok(value);
        }
        match native {
            NativeValue::Time(t) => Ok(Value::Time(t)),
            NativeValue::String(ref s) => parse_time(s)
                .map(Value::Time)
                .ok_or_else(|| reject(ValueType::Time, &native)),
            other => Err(reject(ValueType::Time, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Time(t) => Ok(NativeValue::Time(*t)),
            other => Err(mismatch(ValueType::Time, other)),
        }
    }
}

/// Timestamps with and without offset both decode to [`Value::Timestamp`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampPipeline;

impl TypePipeline for TimestampPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Timestamp
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Timestamp, NativeType::TimestampTz]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        if let Some(value) = object_value(&native) {
            return Ok(value);
        }
        match native {
            NativeValue::Timestamp(ts) => Ok(Value::Timestamp(ts)),
            NativeValue::TimestampTz(ts) => Ok(Value::Timestamp(ts.naive_utc())),
            NativeValue::Date(d) => d
                .and_hms_opt(0, 0, 0)
                .map(Value::Timestamp)
                .ok_or_else(|| reject(ValueType::Timestamp, &native)),
            NativeValue::String(ref s) => parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| reject(ValueType::Timestamp, &native)),
            other => Err(reject(ValueType::Timestamp, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Timestamp(ts) => Ok(NativeValue::Timestamp(*ts)),
            other => Err(mismatch(ValueType::Timestamp, other)),
        }
    }
}

/// Arbitrary precision decimals.
///
/// Encoding produces a native double, so values that do not fit a double
/// exactly lose precision on the way out.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalPipeline;

impl TypePipeline for DecimalPipeline {
    fn value_type(&self) -> ValueType {
        ValueType::Decimal
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::BigDecimal]
    }

    fn decode(&self, native: NativeValue) -> Result<Value> {
        if let Some(value) = object_value(&native) {
            return Ok(value);
        }
        match native {
            NativeValue::BigDecimal(d) => Ok(Value::Decimal(d)),
            NativeValue::Byte(n) => Ok(Value::Decimal(Decimal::from(n))),
            NativeValue::Short(n) => Ok(Value::Decimal(Decimal::from(n))),
            NativeValue::Int(n) => Ok(Value::Decimal(Decimal::from(n))),
            NativeValue::Long(n) => Ok(Value::Decimal(Decimal::from(n))),
            NativeValue::Float(f) => Decimal::try_from(f)
                .map(Value::Decimal)
                .map_err(|_| reject(ValueType::Decimal, &native)),
            NativeValue::Double(f) => Decimal::try_from(f)
                .map(Value::Decimal)
                .map_err(|_| reject(ValueType::Decimal, &native)),
            NativeValue::String(ref s) => Decimal::from_str(s.trim())
                .or_else(|_| Decimal::from_scientific(s.trim()))
                .map(Value::Decimal)
                .map_err(|_| reject(ValueType::Decimal, &native)),
            other => Err(reject(ValueType::Decimal, &other)),
        }
    }

    fn encode(&self, value: &Value) -> Result<NativeValue> {
        match value {
            Value::Decimal(d) => {
                let float = d
                    .to_f64()
                    .ok_or_else(|| Error::data(format!("decimal {} does not fit a double", d)))?;
                if Decimal::try_from(float).ok() != Some(d.normalize()) {
                    tracing::warn!(decimal = %d, encoded = float, "lossy decimal encoding");
                }
                Ok(NativeValue::Double(float))
            }
            other => Err(mismatch(ValueType::Decimal, other)),
        }
    }
}

/// Parse an ISO-8601 date, also accepting a full timestamp.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

/// Parse an ISO-8601 time of day.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Parse an ISO-8601 timestamp; offsets are normalised to UTC.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Some(ts.naive_utc());
        }
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{HasNativeDecode, NativeObject};
    use chrono::{FixedOffset, TimeZone};

    fn ready_registry() -> TypeRegistry {
        let registry = TypeRegistry::with_builtins();
        assert!(registry.initialize());
        registry
    }

    #[test]
    fn test_lookups_fail_before_initialize() {
        let registry = TypeRegistry::with_builtins();
        assert!(!registry.is_ready());
        let err = registry.resolve(ValueType::Int).unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
    }

    #[test]
    fn test_initialize_runs_once() {
        let registry = TypeRegistry::with_builtins();
        assert!(registry.initialize());
        let count = registry.len();
        assert!(!registry.initialize());
        assert_eq!(registry.len(), count);
    }

    #[test]
    fn test_all_keys_resolve_consistently() {
        let registry = ready_registry();
        for value_type in ValueType::ALL {
            let by_type = registry.resolve(value_type).unwrap();
            let by_name = registry
                .resolve(PipelineKey::name(&value_type.name().to_lowercase()))
                .unwrap();
            assert!(Arc::ptr_eq(&by_type, &by_name), "{value_type}");
            for native in by_type.native_types() {
                let by_native = registry.resolve(*native).unwrap();
                assert!(Arc::ptr_eq(&by_type, &by_native), "{native}");
            }
        }
    }

    #[test]
    fn test_type_code_resolves_through_table() {
        let registry = ready_registry();
        let clob = registry.resolve(PipelineKey::TypeCode(codes::CLOB)).unwrap();
        assert_eq!(clob.value_type(), ValueType::Text);
        let tstz = registry
            .resolve(PipelineKey::TypeCode(codes::TIMESTAMP_WITH_TIMEZONE))
            .unwrap();
        assert_eq!(tstz.value_type(), ValueType::Timestamp);
        assert!(matches!(
            registry.resolve(PipelineKey::TypeCode(-9999)),
            Err(Error::Lookup(_))
        ));
        assert_eq!(registry.type_code("varchar"), Some(codes::VARCHAR));
    }

    #[derive(Debug)]
    struct ShadowInt;

    impl TypePipeline for ShadowInt {
        fn value_type(&self) -> ValueType {
            ValueType::Int
        }
        fn native_types(&self) -> &'static [NativeType] {
            &[NativeType::Long]
        }
        fn decode(&self, _native: NativeValue) -> Result<Value> {
            Ok(Value::Int(-1))
        }
        fn encode(&self, _value: &Value) -> Result<NativeValue> {
            Ok(NativeValue::Long(-1))
        }
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = ready_registry();
        assert!(!registry.register(Arc::new(ShadowInt)));
        assert_eq!(
            registry.decode(NativeValue::Long(5)).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn test_enqueue_after_ready_registers_immediately() {
        let registry = TypeRegistry::new();
        registry.initialize();
        registry.enqueue(Box::new(|| Arc::new(ShadowInt) as Arc<dyn TypePipeline>));
        assert_eq!(registry.decode(NativeValue::Long(5)).unwrap(), Value::Int(-1));
    }

    #[test]
    fn test_round_trips() {
        let registry = ready_registry();
        let ts = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_micro_opt(13, 45, 12, 250_000)
            .unwrap();
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Int(42),
            Value::Float(2.5),
            Value::Text("x".to_string()),
            Value::Bytes(vec![0, 1, 255]),
            Value::Date(ts.date()),
            Value::Time(ts.time()),
            Value::Timestamp(ts),
        ];
        for value in values {
            let native = registry.encode(&value).unwrap();
            assert_eq!(registry.decode(native).unwrap(), value);
        }
    }

    #[test]
    fn test_decimal_encoding_is_lossy_but_numerically_close() {
        let registry = ready_registry();
        let original = Decimal::from_str("1.10").unwrap();
        let native = registry.encode(&Value::Decimal(original)).unwrap();
        assert!(matches!(native, NativeValue::Double(_)));

        let decoded = registry
            .resolve(ValueType::Decimal)
            .unwrap()
            .decode(native)
            .unwrap();
        let back = decoded.as_f64().unwrap();
        assert!((back - 1.10).abs() < 1e-12);
    }

    #[test]
    fn test_timestamp_with_offset_normalises_to_utc() {
        let registry = ready_registry();
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let decoded = registry.decode(NativeValue::TimestampTz(local)).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(decoded, Value::Timestamp(expected));
    }

    #[test]
    fn test_decode_column_parses_text_for_temporal_codes() {
        let registry = ready_registry();
        assert_eq!(
            registry
                .decode_column(codes::DATE, NativeValue::String("2023-07-04".into()))
                .unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2023, 7, 4).unwrap())
        );
        assert_eq!(
            registry
                .decode_column(codes::BOOLEAN, NativeValue::Long(1))
                .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            registry
                .decode_column(
                    codes::TIMESTAMP,
                    NativeValue::String("2023-07-04 08:30:00".into())
                )
                .unwrap(),
            Value::Timestamp(
                NaiveDate::from_ymd_opt(2023, 7, 4)
                    .unwrap()
                    .and_hms_opt(8, 30, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_decode_column_falls_back_to_native_type() {
        let registry = ready_registry();
        // dynamically typed engines may hold text in an INTEGER column
        assert_eq!(
            registry
                .decode_column(codes::INTEGER, NativeValue::String("abc".into()))
                .unwrap(),
            Value::Text("abc".into())
        );
        assert_eq!(
            registry.decode_column(codes::NULL, NativeValue::Long(3)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            registry.decode_column(codes::VARCHAR, NativeValue::Null).unwrap(),
            Value::Null
        );
    }

    #[derive(Debug)]
    struct Wrapped(i64);

    impl NativeObject for Wrapped {
        fn class_name(&self) -> &str {
            "com.example.Wrapped"
        }
        fn as_native_decode(&self) -> Option<&dyn HasNativeDecode> {
            Some(self)
        }
    }

    impl HasNativeDecode for Wrapped {
        fn to_value(&self) -> Value {
            Value::Int(self.0)
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl NativeObject for Opaque {
        fn class_name(&self) -> &str {
            "com.example.Opaque"
        }
    }

    #[test]
    fn test_object_pipeline_uses_native_decode_capability() {
        let registry = ready_registry();
        let wrapped: Arc<dyn NativeObject> = Arc::new(Wrapped(9));
        assert_eq!(
            registry.decode(NativeValue::Object(wrapped)).unwrap(),
            Value::Int(9)
        );

        let opaque: Arc<dyn NativeObject> = Arc::new(Opaque);
        let decoded = registry
            .decode(NativeValue::Object(Arc::clone(&opaque)))
            .unwrap();
        assert_eq!(decoded, Value::Object(opaque));
    }

    #[test]
    fn test_encode_rejects_mismatched_value() {
        let err = IntPipeline.encode(&Value::Text("1".into())).unwrap_err();
        assert!(err.is_a(crate::error::DriverErrorKind::Data));
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_date("2024-02-29").is_some());
        assert!(parse_date("2024-02-30").is_none());
        assert_eq!(
            parse_time("08:15").unwrap(),
            NaiveTime::from_hms_opt(8, 15, 0).unwrap()
        );
        assert!(parse_timestamp("2024-01-01T00:00:00Z").is_some());
        assert!(parse_timestamp("2024-01-01 00:00:00.5+01:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
