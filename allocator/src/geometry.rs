//! Translation-regime geometry: granule/level derivation and the hardware
//! register values (`TCR`/`MAIR`, `VTCR`) that follow from a `Config`.

use typestate::bitregs;

use crate::PgtableError;

/// Translation regime and word width. The tree-walking algorithms in
/// `mapper`/`unmapper`/`translate` are format-agnostic; only the descriptor
/// codec and this module branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Stage1_64,
    Stage2_64,
    Stage1_32,
    Stage2_32,
}

impl Format {
    #[inline]
    pub const fn is_stage2(self) -> bool {
        matches!(self, Format::Stage2_64 | Format::Stage2_32)
    }

    #[inline]
    pub const fn is_32bit(self) -> bool {
        matches!(self, Format::Stage1_32 | Format::Stage2_32)
    }
}

/// Quirk flags recognized by this allocator. Currently only the one the
/// distilled interface names: forcing NS/NSTABLE into every descriptor it
/// writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quirks(u32);

impl Quirks {
    pub const NONE: Self = Self(0);
    pub const ARM_NS: Self = Self(1 << 0);

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl core::ops::BitOr for Quirks {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

const DESCRIPTOR_SIZE_BITS: u32 = 3; // log2(8)

/// Page sizes a granule's block-size ladder supports, smallest first.
const fn block_sizes_for_granule(pg_shift: u32) -> [u64; 3] {
    match pg_shift {
        12 => [1 << 12, 1 << 21, 1 << 30], // 4K, 2M, 1G
        14 => [1 << 14, 1 << 25, 0],       // 16K, 32M
        16 => [1 << 16, 1 << 29, 0],       // 64K, 512M
        _ => [0, 0, 0],
    }
}

/// Derived, immutable geometry for one translation tree.
#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    pub ias: u32,
    pub oas: u32,
    pub pgsize_bitmap: u64,
    pub format: Format,
    pub quirks: Quirks,
    pub pg_shift: u32,
    pub bits_per_level: u32,
    pub levels: u32,
    pub start_level: u8,
    /// Number of entries in the root table (may exceed `entries_per_table`
    /// when Stage-2 concatenation folds a level into it).
    pub root_entries: usize,
    pub entries_per_table: usize,
    /// Set when `root_entries` already reflects Stage-2 concatenation (§4.2)
    /// folding the top level into a widened root.
    concatenated: bool,
}

impl Geometry {
    pub fn new(
        ias: u32,
        oas: u32,
        pgsize_bitmap: u64,
        format: Format,
        quirks: Quirks,
    ) -> Result<Self, PgtableError> {
        if ias == 0 || oas == 0 || ias > 48 || oas > 48 {
            return Err(PgtableError::InvalidArgument);
        }
        if format.is_32bit() {
            let max_ias = if format.is_stage2() { 40 } else { 32 };
            if ias > max_ias {
                return Err(PgtableError::InvalidArgument);
            }
        }

        let granule = pick_granule(pgsize_bitmap)?;
        let pg_shift = granule.trailing_zeros();
        let bits_per_level = pg_shift - DESCRIPTOR_SIZE_BITS;
        let restricted_bitmap = pgsize_bitmap & granule_block_bitmap(pg_shift);
        if restricted_bitmap == 0 {
            return Err(PgtableError::InvalidArgument);
        }

        let bits_resolved = ias.saturating_sub(pg_shift);
        let mut levels = 1u32;
        while (levels - 1) * bits_per_level < bits_resolved {
            levels += 1;
        }
        levels = levels.clamp(1, 4);
        let mut start_level = (4 - levels) as u8;

        let root_bits = bits_resolved - (levels - 1) * bits_per_level;
        let entries_per_table = 1usize << bits_per_level;

        // Stage-2 concatenation (§4.2): a full-depth (4-level) walk whose
        // root would only resolve a handful of bits wastes a level holding
        // almost nothing. When that root fits in at most 16 granules, fold
        // it into the table one level down instead: start the walk there
        // and widen that table's root by the folded root's entry count.
        let concatenated = format.is_stage2() && levels == 4 && root_bits <= 4;
        let (levels, root_entries) = if concatenated {
            start_level += 1;
            (levels - 1, (1usize << root_bits) * entries_per_table)
        } else {
            (levels, 1usize << root_bits)
        };

        Ok(Self {
            ias,
            oas,
            pgsize_bitmap: restricted_bitmap,
            format,
            quirks,
            pg_shift,
            bits_per_level,
            levels,
            start_level,
            root_entries,
            entries_per_table,
            concatenated,
        })
    }

    /// The root's entry count if Stage-2 concatenation folded a level into
    /// it (§4.2/§11), or `None` for a normal single-granule root. Exposed so
    /// a driver can size wrapper structures around the root without
    /// recomputing the concatenation rule.
    pub fn concatenated_root_entries(&self) -> Option<usize> {
        self.concatenated.then_some(self.root_entries)
    }

    #[inline]
    pub fn level_shift(&self, level: u8) -> u32 {
        self.pg_shift + (3 - level as u32) * self.bits_per_level
    }

    #[inline]
    pub fn block_size(&self, level: u8) -> u64 {
        1u64 << self.level_shift(level)
    }

    #[inline]
    pub fn index(&self, iova: u64, level: u8) -> usize {
        let shift = self.level_shift(level);
        let entries = if level == self.start_level {
            self.root_entries
        } else {
            self.entries_per_table
        };
        ((iova >> shift) as usize) & (entries - 1)
    }

    /// Largest page size in `pgsize_bitmap` that divides `iova | pa` and
    /// does not exceed `remaining`. Shared by the unmap loop and the
    /// scatter-gather mapper (§4.4/§4.5).
    pub fn iommu_pgsize(&self, iova: u64, pa: u64, remaining: u64) -> Option<u64> {
        iommu_pgsize(self.pgsize_bitmap, iova, pa, remaining)
    }

    /// Builds the register set a driver programs to point the MMU/SMMU at
    /// this tree's root, given the root table's physical address.
    pub fn registers(&self, root_pa: u64) -> Registers {
        match self.format {
            Format::Stage1_64 | Format::Stage1_32 => {
                let t0sz = (64 - self.ias) as u64;
                let tg0 = tg_encoding(self.pg_shift);
                let mut tcr = TcrEl1::new()
                    .set(TcrEl1::t0sz, t0sz)
                    .set(TcrEl1::irgn0, 0b01)
                    .set(TcrEl1::orgn0, 0b01)
                    .set(TcrEl1::sh0, 0b11)
                    .set(TcrEl1::tg0, tg0)
                    .set(TcrEl1::ips, parange_encoding(self.oas))
                    .set(TcrEl1::epd1, 1);
                if self.format.is_32bit() {
                    tcr = tcr.with_bits(tcr.bits() & 0xFFFF_FFFF);
                }
                let mair = MairEl1::new()
                    .set(MairEl1::attr0, 0x00) // device-nGnRnE
                    .set(MairEl1::attr1, 0x44) // normal non-cacheable
                    .set(MairEl1::attr2, 0xFF); // normal write-back RW allocate
                Registers::Stage1 { tcr, mair, ttbr0: root_pa }
            }
            Format::Stage2_64 | Format::Stage2_32 => {
                let t0sz = (64 - self.ias) as u64;
                let tg0 = tg_encoding(self.pg_shift);
                let sl0 = stage2_sl0(self.start_level, self.pg_shift);
                let mut vtcr = VtcrEl2::new()
                    .set(VtcrEl2::t0sz, t0sz)
                    .set(VtcrEl2::sl0, sl0)
                    .set(VtcrEl2::irgn0, 0b01)
                    .set(VtcrEl2::orgn0, 0b01)
                    .set(VtcrEl2::sh0, 0b11)
                    .set(VtcrEl2::tg0, tg0)
                    .set(VtcrEl2::ps, parange_encoding(self.oas));
                if self.format.is_32bit() {
                    vtcr = vtcr.with_bits(vtcr.bits() & 0xFFFF_FFFF);
                }
                Registers::Stage2 { vtcr, vttbr: root_pa }
            }
        }
    }
}

fn pick_granule(pgsize_bitmap: u64) -> Result<u64, PgtableError> {
    const CANDIDATES: [u64; 3] = [1 << 12, 1 << 14, 1 << 16];
    let cpu_page = 1u64 << 12;
    if pgsize_bitmap & cpu_page != 0 {
        return Ok(cpu_page);
    }
    let mut best: Option<u64> = None;
    for g in CANDIDATES {
        if pgsize_bitmap & g != 0 && g < cpu_page {
            best = Some(best.map_or(g, |b| b.max(g)));
        }
    }
    if let Some(g) = best {
        return Ok(g);
    }
    for g in CANDIDATES {
        if pgsize_bitmap & g != 0 {
            return Ok(g);
        }
    }
    Err(PgtableError::InvalidArgument)
}

fn granule_block_bitmap(pg_shift: u32) -> u64 {
    block_sizes_for_granule(pg_shift)
        .into_iter()
        .filter(|&s| s != 0)
        .fold(0u64, |acc, s| acc | s)
}

fn tg_encoding(pg_shift: u32) -> u64 {
    match pg_shift {
        12 => 0b00,
        16 => 0b01,
        14 => 0b10,
        _ => unreachable!("pg_shift restricted to 12/14/16 by pick_granule"),
    }
}

fn parange_encoding(oas: u32) -> u64 {
    match oas {
        0..=32 => 0b000,
        33..=36 => 0b001,
        37..=40 => 0b010,
        41..=42 => 0b011,
        43..=44 => 0b100,
        _ => 0b101, // up to 48 bits
    }
}

fn stage2_sl0(start_level: u8, pg_shift: u32) -> u64 {
    // SL0 selects the initial lookup level; for the 4K granule the encoding
    // is offset by one relative to the raw start level.
    let base = 3 - start_level as u64;
    if pg_shift == 12 { (base + 1) & 0b11 } else { base }
}

pub fn iommu_pgsize(pgsize_bitmap: u64, iova: u64, pa: u64, remaining: u64) -> Option<u64> {
    if remaining == 0 {
        return None;
    }
    let align = (iova | pa).trailing_zeros();
    let mut candidates = pgsize_bitmap;
    let mut best: Option<u64> = None;
    while candidates != 0 {
        let size = 1u64 << candidates.trailing_zeros();
        candidates &= candidates - 1;
        let size_shift = size.trailing_zeros();
        if size_shift <= align && size <= remaining {
            best = Some(best.map_or(size, |b| b.max(size)));
        }
    }
    best
}

bitregs! {
    /// TCR_EL1 — Stage-1 translation control, trimmed to the fields this
    /// allocator programs; everything else is RES0.
    pub struct TcrEl1: u64 {
        pub t0sz@[5:0],
        reserved@[6:6] [res0],
        pub epd0@[7:7],
        pub irgn0@[9:8],
        pub orgn0@[11:10],
        pub sh0@[13:12],
        pub tg0@[15:14],
        pub t1sz@[21:16],
        pub a1@[22:22],
        pub epd1@[23:23],
        pub irgn1@[25:24],
        pub orgn1@[27:26],
        pub sh1@[29:28],
        pub tg1@[31:30],
        pub ips@[34:32],
        reserved@[35:35] [res0],
        pub asid_sel@[36:36],
        pub tbi0@[37:37],
        pub tbi1@[38:38],
        reserved@[63:39] [res0],
    }
}

bitregs! {
    /// MAIR_EL1 — eight 8-bit memory-attribute indices.
    pub struct MairEl1: u64 {
        pub attr0@[7:0],
        pub attr1@[15:8],
        pub attr2@[23:16],
        pub attr3@[31:24],
        pub attr4@[39:32],
        pub attr5@[47:40],
        pub attr6@[55:48],
        pub attr7@[63:56],
    }
}

bitregs! {
    /// VTCR_EL2 — Stage-2 translation control, trimmed to the fields this
    /// allocator programs.
    pub struct VtcrEl2: u64 {
        pub t0sz@[5:0],
        pub sl0@[7:6],
        pub irgn0@[9:8],
        pub orgn0@[11:10],
        pub sh0@[13:12],
        pub tg0@[15:14],
        pub ps@[18:16],
        pub vs@[19:19],
        reserved@[20:20] [res0],
        pub ha@[21:21],
        pub hd@[22:22],
        reserved@[24:23] [res0],
        reserved@[28:25] [ignore],
        pub nsw@[29:29],
        pub nsa@[30:30],
        reserved@[31:31] [res1],
        reserved@[63:32] [res0],
    }
}

/// Register values an `alloc()` call hands back for the driver to program.
/// `ttbr0`/`vttbr` carry the root table's physical address; this allocator
/// never reads `TTBR1` since every tree it manages owns the full input
/// address space starting at `TTBR0`/`VTTBR`.
#[derive(Clone, Copy, Debug)]
pub enum Registers {
    Stage1 { tcr: TcrEl1, mair: MairEl1, ttbr0: u64 },
    Stage2 { vtcr: VtcrEl2, vttbr: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage1_64_4k_geometry_is_four_levels() {
        let geo = Geometry::new(48, 48, 1 << 12 | 1 << 21 | 1 << 30, Format::Stage1_64, Quirks::NONE).unwrap();
        assert_eq!(geo.pg_shift, 12);
        assert_eq!(geo.bits_per_level, 9);
        assert_eq!(geo.levels, 4);
        assert_eq!(geo.start_level, 0);
    }

    #[test]
    fn unsupported_granule_is_rejected() {
        assert_eq!(
            Geometry::new(48, 48, 1 << 13, Format::Stage1_64, Quirks::NONE).unwrap_err(),
            PgtableError::InvalidArgument
        );
    }

    #[test]
    fn thirty_two_bit_stage1_caps_ias() {
        assert_eq!(
            Geometry::new(40, 32, 1 << 12, Format::Stage1_32, Quirks::NONE).unwrap_err(),
            PgtableError::InvalidArgument
        );
        assert!(Geometry::new(32, 32, 1 << 12, Format::Stage1_32, Quirks::NONE).is_ok());
    }

    #[test]
    fn iommu_pgsize_picks_largest_aligned_size() {
        let bitmap = (1 << 12) | (1 << 21) | (1 << 30);
        assert_eq!(iommu_pgsize(bitmap, 2 << 20, 2 << 20, 4 << 20), Some(1 << 21));
        assert_eq!(iommu_pgsize(bitmap, 0x1000, 0x1000, 0x1000), Some(1 << 12));
        assert_eq!(iommu_pgsize(bitmap, 0, 0, 0), None);
    }

    #[test]
    fn registers_roundtrip_t0sz() {
        let geo = Geometry::new(39, 40, 1 << 12, Format::Stage1_64, Quirks::NONE).unwrap();
        match geo.registers(0x4000_0000) {
            Registers::Stage1 { tcr, ttbr0, .. } => {
                assert_eq!(tcr.get(TcrEl1::t0sz), 64 - 39);
                assert_eq!(ttbr0, 0x4000_0000);
            }
            Registers::Stage2 { .. } => panic!("expected stage1"),
        }
    }
}
