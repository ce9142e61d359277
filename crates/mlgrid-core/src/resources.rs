//! Resource quantity arithmetic.
//!
//! A `Resources` value describes either a capacity, a usage level, or a
//! request, depending on context. The tracker works with a capacity and
//! a used amount per host; flavors translate into requests.

use serde::{Deserialize, Serialize};

/// A bundle of resource quantities (cpu cores, memory MiB, disk GiB).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resources {
    pub cpu: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
}

impl Resources {
    pub fn new(cpu: u32, memory_mb: u64, disk_gb: u64) -> Self {
        Self {
            cpu,
            memory_mb,
            disk_gb,
        }
    }

    /// Whether `request` fits inside `self` on every axis.
    pub fn fits(&self, request: &Resources) -> bool {
        self.cpu >= request.cpu
            && self.memory_mb >= request.memory_mb
            && self.disk_gb >= request.disk_gb
    }

    /// Component-wise saturating subtraction.
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu.saturating_sub(other.cpu),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb),
            disk_gb: self.disk_gb.saturating_sub(other.disk_gb),
        }
    }

    /// Component-wise addition.
    pub fn add(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu + other.cpu,
            memory_mb: self.memory_mb + other.memory_mb,
            disk_gb: self.disk_gb + other.disk_gb,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Resources::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_requires_every_axis() {
        let capacity = Resources::new(4, 8192, 100);
        assert!(capacity.fits(&Resources::new(4, 8192, 100)));
        assert!(capacity.fits(&Resources::new(1, 1024, 0)));
        assert!(!capacity.fits(&Resources::new(5, 1024, 0)));
        assert!(!capacity.fits(&Resources::new(1, 9000, 0)));
    }

    #[test]
    fn sub_then_add_round_trips() {
        let capacity = Resources::new(4, 8192, 100);
        let request = Resources::new(2, 4096, 10);
        let after = capacity.saturating_sub(&request);
        assert_eq!(after, Resources::new(2, 4096, 90));
        assert_eq!(after.add(&request), capacity);
    }
}
