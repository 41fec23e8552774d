//! Multi-plane single-producer/single-consumer byte ring.
//!
//! Each plane is its own `ringbuf` SPSC ring. Planes are written and read in
//! index order, so the last plane is always the one furthest behind: its
//! occupancy is what both sides report, which makes a write or read count
//! only once the last plane has been handled.

use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::TryReserveError;

pub struct PlaneWriter {
    planes: Vec<HeapProd<u8>>,
    capacity: usize,
}

pub struct PlaneReader {
    planes: Vec<HeapCons<u8>>,
    capacity: usize,
}

/// Allocate a ring of `planes` planes holding `bytes_per_plane` bytes each.
/// A zero size is rounded up to one byte.
pub fn plane_ring(
    bytes_per_plane: usize,
    planes: usize,
) -> Result<(PlaneWriter, PlaneReader), TryReserveError> {
    let capacity = bytes_per_plane.max(1);
    let mut producers = Vec::new();
    let mut consumers = Vec::new();
    producers.try_reserve_exact(planes)?;
    consumers.try_reserve_exact(planes)?;
    for _ in 0..planes {
        let (producer, consumer) = HeapRb::<u8>::try_new(capacity)?.split();
        producers.push(producer);
        consumers.push(consumer);
    }
    Ok((
        PlaneWriter {
            planes: producers,
            capacity,
        },
        PlaneReader {
            planes: consumers,
            capacity,
        },
    ))
}

macro_rules! size_queries {
    ($ty:ty) => {
        impl $ty {
            /// Bytes per plane waiting to be read.
            pub fn read_size(&self) -> usize {
                self.planes.last().map_or(0, |p| p.occupied_len())
            }

            /// Bytes per plane that can be written without overrunning the reader.
            pub fn write_size(&self) -> usize {
                self.planes.last().map_or(0, |p| p.vacant_len())
            }

            pub fn max_size(&self) -> usize {
                self.capacity
            }

            pub fn planes(&self) -> usize {
                self.planes.len()
            }
        }
    };
}

size_queries!(PlaneWriter);
size_queries!(PlaneReader);

impl PlaneWriter {
    /// Copy `src` into `plane`. The visible size grows by `src.len()` once
    /// the last plane is written. Returns `false` without copying when `src`
    /// does not fit or `plane` is out of range.
    pub fn write(&mut self, src: &[u8], plane: usize) -> bool {
        if src.len() > self.write_size() {
            return false;
        }
        match self.planes.get_mut(plane) {
            Some(producer) if producer.vacant_len() >= src.len() => {
                producer.push_slice(src) == src.len()
            }
            _ => false,
        }
    }

    /// Copy the same bytes into every plane.
    pub fn write_all(&mut self, src: &[u8]) -> bool {
        if src.len() > self.write_size() {
            return false;
        }
        (0..self.planes()).all(|plane| self.write(src, plane))
    }

    /// Discard everything buffered. Must not race with a reader.
    pub fn dump(&mut self) {
        for producer in &mut self.planes {
            // SAFETY: `u8` needs no drop, and the reader is idle, so moving
            // the write index back onto the read index only forgets bytes.
            unsafe { producer.set_write_index(producer.read_index()) };
        }
    }
}

impl PlaneReader {
    /// Fill `dst` from `plane`. The visible size shrinks by `dst.len()` once
    /// the last plane is read. Returns `false` without copying when fewer than
    /// `dst.len()` bytes are buffered or `plane` is out of range.
    pub fn read(&mut self, dst: &mut [u8], plane: usize) -> bool {
        if dst.len() > self.read_size() {
            return false;
        }
        match self.planes.get_mut(plane) {
            Some(consumer) if consumer.occupied_len() >= dst.len() => {
                consumer.pop_slice(dst) == dst.len()
            }
            _ => false,
        }
    }
}
