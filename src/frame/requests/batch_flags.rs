// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the batch flags.

/// The batch flag indicating whether the serial consistency is present.
pub const SERIAL_CONSISTENCY: u8 = 0x10;
/// The batch flag indicating whether the default timestamp is present.
pub const DEFAULT_TIMESTAMP: u8 = 0x20;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchFlags(pub u8);

impl BatchFlags {
    pub fn serial_consistency(&self) -> bool {
        self.0 & SERIAL_CONSISTENCY != 0
    }

    pub fn set_serial_consistency(&mut self, value: bool) {
        if value {
            self.0 |= SERIAL_CONSISTENCY;
        } else {
            self.0 &= !SERIAL_CONSISTENCY;
        }
    }

    pub fn default_timestamp(&self) -> bool {
        self.0 & DEFAULT_TIMESTAMP != 0
    }

    pub fn set_default_timestamp(&mut self, value: bool) {
        if value {
            self.0 |= DEFAULT_TIMESTAMP;
        } else {
            self.0 &= !DEFAULT_TIMESTAMP;
        }
    }
}
