// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines how values are bound to the frames that carry them.
//! Everything funnels through [`CqlValue`], so a bound value is encoded
//! exactly once and all bind errors are [`ValueEncodeError`]s.

use super::value::{
    CqlValue,
    ValueEncodeError,
};
use std::fmt::Debug;

/// Collects the bound values of a statement. Implementors only store encoded
/// cells; the encoding itself happens here, through [`CqlValue`].
pub trait Binder: Sized {
    type Error: From<ValueEncodeError> + Debug;

    /// Append one encoded cell, optionally tied to a marker name.
    fn bind_cell(self, name: Option<&str>, cell: Vec<u8>) -> Result<Self, Self::Error>;

    /// Bind the next positional value.
    fn value<V: Into<CqlValue>>(self, value: V) -> Result<Self, Self::Error> {
        let cell = value.into().encode_new()?;
        self.bind_cell(None, cell)
    }

    /// Bind a value to a named marker.
    fn named_value<V: Into<CqlValue>>(self, name: &str, value: V) -> Result<Self, Self::Error> {
        let cell = value.into().encode_new()?;
        self.bind_cell(Some(name), cell)
    }

    /// Bind a null, note: for write queries this will create a tombstone.
    fn null_value(self) -> Result<Self, Self::Error> {
        self.value(CqlValue::Null)
    }

    /// Bind an unset marker, leaving any existing cell untouched.
    fn unset_value(self) -> Result<Self, Self::Error> {
        self.value(CqlValue::Unset)
    }

    /// Bind a whole set of values in one go.
    fn bind<V: Bindable + ?Sized>(self, values: &V) -> Result<Self, Self::Error> {
        values.bind(self)
    }
}

/// A set of values that knows how to bind itself.
pub trait Bindable {
    /// Bind these values using the provided binder.
    fn bind<B: Binder>(&self, binder: B) -> Result<B, B::Error>;
}

impl<T: Into<CqlValue> + Clone> Bindable for T {
    fn bind<B: Binder>(&self, binder: B) -> Result<B, B::Error> {
        binder.value(self.clone())
    }
}

impl<T: Bindable> Bindable for [T] {
    fn bind<B: Binder>(&self, mut binder: B) -> Result<B, B::Error> {
        for value in self.iter() {
            binder = value.bind(binder)?;
        }
        Ok(binder)
    }
}
