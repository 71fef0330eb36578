//! Read-only accessors the core uses to reach market data, plus the scratch
//! buffer allocator.
//!
//! The host owns bars and trades. Components receive a `&dyn BarSource` or
//! `&dyn MarketData` on every call instead of keeping a reference, so a
//! cached statistics object never holds its security alive.

use chrono::NaiveDateTime;
use parking_lot::Mutex;

use crate::domain::{Bar, Trade};

/// Per-bar scalar source. `index` must be below `count()`.
pub trait BarSource: Send + Sync {
    fn count(&self) -> usize;

    /// Raw input fed to scalar computations (the close for OHLC bars).
    fn value(&self, index: usize) -> f64;

    fn timestamp(&self, index: usize) -> NaiveDateTime;
}

/// Per-bar access to the trade tape of one security.
pub trait TradeSource: Send + Sync {
    fn security_id(&self) -> &str;

    fn trades_for_bar(&self, index: usize) -> &[Trade];
}

/// Bars and trades of the same security.
pub trait MarketData: BarSource + TradeSource {}

impl<T: BarSource + TradeSource + ?Sized> MarketData for T {}

impl BarSource for [Bar] {
    fn count(&self) -> usize {
        self.len()
    }

    fn value(&self, index: usize) -> f64 {
        self[index].close
    }

    fn timestamp(&self, index: usize) -> NaiveDateTime {
        self[index].timestamp
    }
}

impl BarSource for Vec<Bar> {
    fn count(&self) -> usize {
        self.len()
    }

    fn value(&self, index: usize) -> f64 {
        self[index].close
    }

    fn timestamp(&self, index: usize) -> NaiveDateTime {
        self[index].timestamp
    }
}

/// Allocator for result and scratch buffers.
///
/// `release` takes the buffer by value, so nothing in the core can keep
/// using a vector after handing it back.
pub trait BufferPool: Send + Sync {
    /// Returns a vector of `len` NaN values.
    fn allocate(&self, len: usize) -> Vec<f64>;

    fn release(&self, buffer: Vec<f64>);
}

/// Plain heap allocation, no reuse.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapPool;

impl BufferPool for HeapPool {
    fn allocate(&self, len: usize) -> Vec<f64> {
        vec![f64::NAN; len]
    }

    fn release(&self, _buffer: Vec<f64>) {}
}

/// Keeps released vectors and hands them out again.
#[derive(Debug, Default)]
pub struct RecyclingPool {
    free: Mutex<Vec<Vec<f64>>>,
    max_retained: usize,
}

impl RecyclingPool {
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
        }
    }

    /// Number of vectors currently parked in the pool.
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }
}

impl BufferPool for RecyclingPool {
    fn allocate(&self, len: usize) -> Vec<f64> {
        let reused = self.free.lock().pop();
        match reused {
            Some(mut buffer) => {
                buffer.clear();
                buffer.resize(len, f64::NAN);
                buffer
            }
            None => vec![f64::NAN; len],
        }
    }

    fn release(&self, buffer: Vec<f64>) {
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buffer);
        }
    }
}
