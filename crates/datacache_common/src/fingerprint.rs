//! Deterministic fingerprints of call arguments.
//!
//! A fingerprint keys the in-memory cache layer. Every argument that takes
//! part in the key must implement [`serde::Serialize`]; it is converted to a
//! canonical JSON value (object keys sorted) so that equal values always
//! produce equal keys across runs. Arguments that should not influence the
//! key are simply not added to the builder.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::hash::ContentHash;

/// Errors raised while building a fingerprint.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// An argument could not be converted to its canonical form.
    #[error("argument '{argument}' is not fingerprintable: {reason}")]
    Unserializable {
        /// Position (`#0`, `#1`, ...) or keyword name of the argument.
        argument: String,
        /// Description of the serialization failure.
        reason: String,
    },
}

/// A 128-bit key derived from an ordered argument list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// Returns the key as a 128-bit integer.
    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

/// Accumulates positional and keyword arguments into a [`Fingerprint`].
///
/// Positional arguments keep their call order; keyword arguments are
/// ordered by name, so `a=3, b=1` and `b=1, a=3` produce the same key.
/// A later keyword with the same name replaces the earlier one.
#[derive(Debug, Default)]
pub struct FingerprintBuilder {
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
    error: Option<FingerprintError>,
}

impl FingerprintBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder whose first positional argument is the function
    /// identity, so memoized results of different functions never collide.
    pub fn for_function(name: &str) -> Self {
        Self::new().arg(&name)
    }

    /// Prepends the function identity to the positional arguments.
    ///
    /// `FingerprintBuilder::new().arg(&1).scoped_to("f")` is the same key as
    /// `FingerprintBuilder::for_function("f").arg(&1)`.
    pub fn scoped_to(mut self, name: &str) -> Self {
        self.args.insert(0, Value::String(name.to_string()));
        self
    }

    /// Appends a positional argument.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        let position = format!("#{}", self.args.len());
        if let Some(value) = self.canonical(position, value) {
            self.args.push(value);
        }
        self
    }

    /// Adds a keyword argument.
    pub fn kwarg<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Self {
        if let Some(value) = self.canonical(name.to_string(), value) {
            self.kwargs.insert(name.to_string(), value);
        }
        self
    }

    /// Hashes the accumulated arguments.
    ///
    /// Fails with the first serialization error encountered while adding
    /// arguments.
    pub fn finish(self) -> Result<Fingerprint, FingerprintError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let (keys, values): (Vec<Value>, Vec<Value>) = self
            .kwargs
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .unzip();
        let document = serde_json::json!({
            "args": self.args,
            "kwargs": { "keys": keys, "values": values },
        });
        Ok(Fingerprint(ContentHash::from_bytes(
            document.to_string().as_bytes(),
        )))
    }

    fn canonical<T: Serialize + ?Sized>(&mut self, argument: String, value: &T) -> Option<Value> {
        if self.error.is_some() {
            return None;
        }
        match serde_json::to_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                self.error = Some(FingerprintError::Unserializable {
                    argument,
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

/// Builds a [`Fingerprint`] from positional and keyword arguments.
///
/// ```
/// use datacache_common::fingerprint;
///
/// let a = fingerprint!(1, 2; a = 3).unwrap();
/// let b = fingerprint!(1, 2; a = 3).unwrap();
/// assert_eq!(a, b);
/// ```
#[macro_export]
macro_rules! fingerprint {
    ($($arg:expr),* $(; $($key:ident = $val:expr),* $(,)?)?) => {{
        let builder = $crate::fingerprint::FingerprintBuilder::new();
        $( let builder = builder.arg(&$arg); )*
        $( $( let builder = builder.kwarg(stringify!($key), &$val); )* )?
        builder.finish()
    }};
}
