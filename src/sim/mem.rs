//! Memory and register storage for the simulator.
//!
//! This module consists of:
//! - [`Mem`]: the full 2^16-word address space
//! - [`RegFile`]: the eight general-purpose registers
//! - [`MachineInitStrategy`]: how both are filled on initialization

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ast::Reg;

/// How memory and registers are filled when the machine is initialized.
///
/// The default fills everything with zero, which keeps runs
/// reproducible. The seeded and unseeded strategies fill with random
/// values, which is useful for catching programs that rely on
/// uninitialized memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineInitStrategy {
    /// Fill every location with the given value.
    Known {
        /// The fill value.
        value: u16
    },
    /// Fill every location with values from a seeded RNG,
    /// making the fill reproducible.
    Seeded {
        /// The seed.
        seed: u64
    },
    /// Fill every location with values from an unseeded RNG.
    Unseeded
}

impl Default for MachineInitStrategy {
    fn default() -> Self {
        MachineInitStrategy::Known { value: 0 }
    }
}

impl MachineInitStrategy {
    pub(super) fn generator(&self) -> WordFiller {
        match *self {
            MachineInitStrategy::Known { value } => WordFiller::Known(value),
            MachineInitStrategy::Seeded { seed } => WordFiller::Seeded(StdRng::seed_from_u64(seed)),
            MachineInitStrategy::Unseeded => WordFiller::Unseeded(StdRng::from_entropy()),
        }
    }
}

/// Produces the fill values for one initialization.
pub(super) enum WordFiller {
    Known(u16),
    Seeded(StdRng),
    Unseeded(StdRng)
}
impl WordFiller {
    fn next_word(&mut self) -> u16 {
        match self {
            WordFiller::Known(value) => *value,
            WordFiller::Seeded(rng) | WordFiller::Unseeded(rng) => rng.gen(),
        }
    }
}

/// The 2^16-word memory of the machine.
///
/// This only holds the backing storage. Access checking and
/// memory-mapped I/O are layered on top by the simulator's
/// `read_mem`/`write_mem`.
pub struct Mem(Box<[u16; 65536]>);
impl Mem {
    pub(super) fn new(filler: &mut WordFiller) -> Self {
        let mut mem = vec![0u16; 65536].into_boxed_slice();
        for word in mem.iter_mut() {
            *word = filler.next_word();
        }

        // length is exactly 65536
        match mem.try_into() {
            Ok(array) => Mem(array),
            Err(_) => unreachable!("backing buffer should be 65536 words"),
        }
    }
}
impl std::ops::Index<u16> for Mem {
    type Output = u16;

    fn index(&self, addr: u16) -> &Self::Output {
        &self.0[usize::from(addr)]
    }
}
impl std::ops::IndexMut<u16> for Mem {
    fn index_mut(&mut self, addr: u16) -> &mut Self::Output {
        &mut self.0[usize::from(addr)]
    }
}
impl std::fmt::Debug for Mem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mem").finish_non_exhaustive()
    }
}

/// The register file (`R0`-`R7`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegFile([u16; 8]);
impl RegFile {
    pub(super) fn new(filler: &mut WordFiller) -> Self {
        RegFile(std::array::from_fn(|_| filler.next_word()))
    }
}
impl std::ops::Index<Reg> for RegFile {
    type Output = u16;

    fn index(&self, reg: Reg) -> &Self::Output {
        &self.0[usize::from(reg)]
    }
}
impl std::ops::IndexMut<Reg> for RegFile {
    fn index_mut(&mut self, reg: Reg) -> &mut Self::Output {
        &mut self.0[usize::from(reg)]
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{R0, R7};

    use super::{MachineInitStrategy, Mem, RegFile};

    #[test]
    fn test_known_fill() {
        let mut filler = MachineInitStrategy::default().generator();
        let mem = Mem::new(&mut filler);
        assert_eq!(mem[0x0000], 0);
        assert_eq!(mem[0xFFFF], 0);

        let mut filler = (MachineInitStrategy::Known { value: 0xDEAD }).generator();
        let regs = RegFile::new(&mut filler);
        assert_eq!(regs[R0], 0xDEAD);
        assert_eq!(regs[R7], 0xDEAD);
    }

    #[test]
    fn test_seeded_fill_reproducible() {
        let strat = MachineInitStrategy::Seeded { seed: 104 };
        let mem_a = Mem::new(&mut strat.generator());
        let mem_b = Mem::new(&mut strat.generator());

        for addr in [0x0000u16, 0x3000, 0x8000, 0xFFFF] {
            assert_eq!(mem_a[addr], mem_b[addr]);
        }
    }

    #[test]
    fn test_reg_indexing() {
        let mut filler = MachineInitStrategy::default().generator();
        let mut regs = RegFile::new(&mut filler);

        regs[R0] = 52;
        assert_eq!(regs[R0], 52);
        assert_eq!(regs[R7], 0);
    }
}
