//! Handler signatures and argument binding.
//!
//! A [`Signature`] lists a handler's parameter names in order. The first
//! `required` of them must be supplied; the rest are optional. A handler may
//! additionally accept surplus positional values ("rest") and surplus keyword
//! values ("extra").
//!
//! Binding a [`Payload`]:
//!
//! | payload        | binding                                  |
//! |----------------|------------------------------------------|
//! | array          | element `i` → parameter `i`              |
//! | object         | key → parameter of the same name         |
//! | other scalar   | the whole value → parameter 0            |
//! | absent         | nothing bound                            |

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use sb_protocol::Payload;

use crate::types::ArgumentError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<String>,
    required: usize,
    rest: bool,
    extra: bool,
}

impl Signature {
    /// All `params` are required.
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        Self {
            required: params.len(),
            params,
            rest: false,
            extra: false,
        }
    }

    /// A handler that takes no arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Append optional parameters after the required ones.
    pub fn optional<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Accept any number of surplus positional values.
    pub fn with_rest(mut self) -> Self {
        self.rest = true;
        self
    }

    /// Accept keyword values that match no parameter.
    pub fn with_extra(mut self) -> Self {
        self.extra = true;
        self
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn bind(&self, payload: Payload) -> Result<Args, ArgumentError> {
        let mut args = Args {
            bound: self.params.iter().map(|p| (p.clone(), None)).collect(),
            rest: Vec::new(),
            extra: Map::new(),
        };

        match payload {
            Payload::None => {}
            Payload::Scalar(value) => self.bind_positional(&mut args, vec![value])?,
            Payload::Positional(items) => self.bind_positional(&mut args, items)?,
            Payload::Named(map) => {
                for (key, value) in map {
                    match args.bound.iter_mut().find(|(name, _)| *name == key) {
                        Some(slot) => slot.1 = Some(value),
                        None if self.extra => {
                            args.extra.insert(key, value);
                        }
                        None => return Err(ArgumentError::UnexpectedKeyword(key)),
                    }
                }
            }
        }

        if let Some((name, _)) = args
            .bound
            .iter()
            .take(self.required)
            .find(|(_, value)| value.is_none())
        {
            return Err(ArgumentError::MissingArgument(name.clone()));
        }

        Ok(args)
    }

    fn bind_positional(&self, args: &mut Args, items: Vec<Value>) -> Result<(), ArgumentError> {
        if items.len() > self.params.len() && !self.rest {
            return Err(ArgumentError::TooManyPositional {
                expected: self.params.len(),
                given: items.len(),
            });
        }
        let mut items = items.into_iter();
        for slot in args.bound.iter_mut() {
            match items.next() {
                Some(value) => slot.1 = Some(value),
                None => break,
            }
        }
        args.rest.extend(items);
        Ok(())
    }
}

/// Arguments bound to a [`Signature`], handed to the handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    bound: Vec<(String, Option<Value>)>,
    rest: Vec<Value>,
    extra: Map<String, Value>,
}

impl Args {
    /// Raw value of a named parameter, if supplied.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bound
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Raw value of the `index`-th parameter, if supplied.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.bound.get(index).and_then(|(_, v)| v.as_ref())
    }

    /// Deserialize a supplied parameter.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        self.value_opt(name)?
            .ok_or_else(|| ArgumentError::MissingArgument(name.to_owned()))
    }

    /// Deserialize an optional parameter; `Ok(None)` when it was not supplied.
    pub fn value_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ArgumentError> {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| ArgumentError::InvalidValue {
                name: name.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Surplus positional values (only with [`Signature::with_rest`]).
    pub fn rest(&self) -> &[Value] {
        &self.rest
    }

    /// Unmatched keyword values (only with [`Signature::with_extra`]).
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Number of parameters that were actually supplied.
    pub fn supplied(&self) -> usize {
        self.bound.iter().filter(|(_, v)| v.is_some()).count()
    }
}
