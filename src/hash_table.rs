//! A hash table using open addressing, linear probing, and graveyard
//! rehashing.
//!
//! The backing storage is a contiguous array of fixed-capacity *bins*. Each
//! bin owns 14 control bytes, a 16-bit search-distance header, and 14 slot
//! cells. A control byte is either empty (127) or holds a 7-bit fragment of
//! the element's hash (the H2) plus a *disordered* flag in the top bit.
//!
//! An element's full hash splits two ways: `H1` reduces it onto a preferred
//! bin index with a wide multiply (high bits), and `H2` is `hash % 127`
//! (a value the empty sentinel can never take). Lookups load one bin's
//! control bytes into a SIMD register and match H2 in a single compare, so
//! the equality predicate only runs on near-certain candidates.
//!
//! ## Design
//!
//! Insertions probe linearly from the preferred bin to the first bin with an
//! empty slot and record how far they walked in the preferred bin's
//! *search distance*. A lookup reads that search distance once and scans at
//! most that many bins, so probe work stays bounded even in a dense table.
//! Erasing simply clears the control byte back to empty; there is no
//! deleted/tombstone marker and search distances are never shrunk in place.
//!
//! What keeps this from degrading is the rehash policy. Every rehash rewrites
//! the table so that live elements sit in hash order with deliberate slack
//! interleaved, and clears every disordered flag. Elements inserted after
//! that are marked disordered; they are the only ones allowed to violate the
//! hash-order layout, and `growth_left` bounds how many of them can exist
//! before the next rehash is forced. The next rehash then merges the ordered
//! majority (already in hash order along the storage scan) with the small
//! disordered minority (collected into a heap, bounded by the search
//! distances) in one left-to-right pass. Since both the source scan and the
//! destination fill move left to right, consumed source pages can be handed
//! back to the OS mid-rehash, capping peak resident memory.
//!
//! The probe window wraps at the end of the physical bin array. A few extra
//! bins past the logical range absorb most overflow from the last logical
//! bins so that wrap-around (which forces the disordered marking) stays
//! rare.
//!
//! [`HashTable<V>`] stores values of type `V` and requires the caller to
//! provide the hash value and an equality predicate for each operation.
//! Prefer the [`HashMap<K, V, S>`] or [`HashSet<T, S>`] wrappers unless you
//! are implementing your own keyed structure.
//!
//! ## Safety invariants
//!
//! The implementation relies on the following:
//!
//! 1. **Occupancy**: a control byte of `EMPTY` (127) marks an uninitialized
//!    slot; any other value marks a slot holding an initialized `V`. A
//!    disordered flag is only ever set on a full byte.
//! 2. **Index bounds**: bin indices handed to the accessors are below
//!    `physical_bins`; lane indices are below the bin's slot count. Probe
//!    loops enforce this by wrapping at `physical_bins`.
//! 3. **Search windows**: every live element whose preferred bin is `b` is
//!    stored within `search_distance(b)` bins of `b` (wrapping). Inserts
//!    widen the distance before they are observable; erases leave it alone.
//! 4. **Scan order**: elements whose disordered flag is clear appear in
//!    nondecreasing hash order along the bin-major, lane-minor storage scan.
//!    Only the rehash writes ordered control bytes, and it fills lanes in
//!    ascending hash order.
//!
//! [`HashMap<K, V, S>`]: crate::hash_map::HashMap
//! [`HashSet<T, S>`]: crate::hash_set::HashSet

use alloc::alloc::handle_alloc_error;
use alloc::boxed::Box;
use alloc::collections::BinaryHeap;
use core::alloc::Layout;
use core::cmp::Reverse;
use core::fmt;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem;
use core::ptr;
use core::ptr::NonNull;

use cfg_if::cfg_if;

/// Slot and control-byte count per bin.
///
/// 14 keeps the control region plus the two header bytes at exactly one
/// 16-byte vector load, so the group scan needs no second fetch.
const BIN_SLOTS: usize = 14;

/// Byte offset of the search-distance header within a bin.
const HEADER_OFFSET: usize = BIN_SLOTS;

const HEADER_BYTES: usize = 2;

/// Control byte marking an unoccupied slot.
///
/// 127 is the one value a stored H2 can never take (`hash % 127 < 127`), so
/// empty lanes can never produce an H2 match, and the low-7-bit compare used
/// by the SIMD paths stays a single operation.
const EMPTY: u8 = 127;

/// Control-byte flag for elements inserted since the last rehash.
const DISORDERED: u8 = 0x80;

/// Header bit flagging the final physical bin.
const LAST_BIN_FLAG: u16 = 1;

/// The search distance is the remaining 15 bits of the header.
const SEARCH_DISTANCE_MAX: usize = 0x7fff;

/// Implementation limit on total slots; beyond this the bin math is treated
/// as a capacity overflow.
const MAX_SLOTS: u128 = 1 << 48;

/// `clear` keeps allocations at most this many slots for reuse; larger
/// tables are released back to the allocator.
const CLEAR_REUSE_MAX_SLOTS: usize = 128;

/// Extra bins appended past the logical range, capped at this many.
const MAX_TAIL_BINS: usize = 4;

#[inline(always)]
fn is_full_ctrl(ctrl: u8) -> bool {
    ctrl & 0x7f != EMPTY
}

#[inline(always)]
fn is_disordered_ctrl(ctrl: u8) -> bool {
    ctrl & DISORDERED != 0
}

#[inline(always)]
fn ordered_ctrl(h2: u8) -> u8 {
    debug_assert!(h2 < EMPTY);
    h2
}

#[inline(always)]
fn disordered_ctrl(h2: u8) -> u8 {
    debug_assert!(h2 < EMPTY);
    DISORDERED | h2
}

/// Preferred bin index for a hash: a wide multiply keeps the high-entropy
/// bits and is monotone in the hash, which the rehash merge relies on.
#[inline(always)]
fn h1(hash: u64, logical_bins: usize) -> usize {
    (((hash as u128) * (logical_bins as u128)) >> 64) as usize
}

#[inline(always)]
fn h2(hash: u64) -> u8 {
    (hash % 127) as u8
}

#[inline(always)]
fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

cfg_if! {
    if #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2"
    ))] {
        #[cfg(target_arch = "x86")]
        use core::arch::x86::*;
        #[cfg(target_arch = "x86_64")]
        use core::arch::x86_64::*;

        type BitMaskWord = u16;
        const BITMASK_SHIFT: u32 = 0;

        #[inline(always)]
        fn lane_bits(lanes: usize) -> BitMaskWord {
            debug_assert!(lanes <= BIN_SLOTS);
            (1u16 << lanes) - 1
        }

        /// One bin's control bytes in an XMM register.
        ///
        /// The load covers 16 bytes: the 14 control bytes plus the two
        /// header bytes, which every mask drops via `lane_bits`.
        #[derive(Clone, Copy)]
        struct Group(__m128i);

        impl Group {
            /// Load the control bytes of the bin starting at `ctrl`.
            ///
            /// # Safety
            ///
            /// `ctrl` must be valid for a 16-byte read. Every bin satisfies
            /// this: the slot region begins at offset 16 or later.
            #[inline(always)]
            unsafe fn load(ctrl: *const u8) -> Self {
                // SAFETY: caller guarantees 16 readable bytes; the load is
                // unaligned-tolerant.
                unsafe { Group(_mm_loadu_si128(ctrl as *const __m128i)) }
            }

            /// Lanes whose stored H2 equals `h2`, ordered or disordered.
            ///
            /// Empty lanes never match: their low 7 bits are 127 and
            /// `h2 < 127`.
            #[inline(always)]
            fn match_h2(self, h2: u8, lanes: usize) -> BitMask {
                // SAFETY: SSE2 is statically enabled for this build.
                unsafe {
                    let low7 = _mm_set1_epi8(0x7f);
                    let cmp = _mm_cmpeq_epi8(
                        _mm_and_si128(self.0, low7),
                        _mm_set1_epi8(h2 as i8),
                    );
                    BitMask((_mm_movemask_epi8(cmp) as BitMaskWord) & lane_bits(lanes))
                }
            }

            /// Lanes holding no value. Exact: an empty byte is 127 and a
            /// full byte never is, even with the disordered bit set.
            #[inline(always)]
            fn mask_empty(self, lanes: usize) -> BitMask {
                // SAFETY: SSE2 is statically enabled for this build.
                unsafe {
                    let cmp = _mm_cmpeq_epi8(self.0, _mm_set1_epi8(EMPTY as i8));
                    BitMask((_mm_movemask_epi8(cmp) as BitMaskWord) & lane_bits(lanes))
                }
            }

            /// Lanes holding a value.
            #[inline(always)]
            fn mask_full(self, lanes: usize) -> BitMask {
                BitMask(self.mask_empty(lanes).0 ^ lane_bits(lanes))
            }

            /// Number of consecutive empty lanes at the start of the bin.
            #[inline(always)]
            fn count_leading_empty(self, lanes: usize) -> usize {
                match self.mask_full(lanes).first() {
                    Some(lane) => lane,
                    None => lanes,
                }
            }
        }
    } else if #[cfg(all(
        target_arch = "aarch64",
        target_feature = "neon",
        target_endian = "little"
    ))] {
        use core::arch::aarch64::*;

        type BitMaskWord = u128;
        const BITMASK_SHIFT: u32 = 3;

        const MSBS: u64 = 0x8080_8080_8080_8080;

        #[inline(always)]
        fn lane_bits(lanes: usize) -> BitMaskWord {
            debug_assert!(lanes <= BIN_SLOTS);
            const ALL: u128 = 0x8080_8080_8080_8080_8080_8080_8080_8080;
            ALL >> (8 * (16 - lanes))
        }

        /// One bin's control bytes in two 8-lane vectors. Lanes 14 and 15
        /// of the second load are the header bytes; `lane_bits` drops them.
        #[derive(Clone, Copy)]
        struct Group {
            lo: uint8x8_t,
            hi: uint8x8_t,
        }

        impl Group {
            /// Load the control bytes of the bin starting at `ctrl`.
            ///
            /// # Safety
            ///
            /// `ctrl` must be valid for a 16-byte read. Every bin satisfies
            /// this: the slot region begins at offset 16 or later.
            #[inline(always)]
            unsafe fn load(ctrl: *const u8) -> Self {
                // SAFETY: caller guarantees 16 readable bytes.
                unsafe {
                    Group {
                        lo: vld1_u8(ctrl),
                        hi: vld1_u8(ctrl.add(8)),
                    }
                }
            }

            #[inline(always)]
            fn combine(lo: uint8x8_t, hi: uint8x8_t, lanes: usize) -> BitMask {
                // SAFETY: NEON is statically enabled for this build.
                unsafe {
                    let lo = vget_lane_u64::<0>(vreinterpret_u64_u8(lo)) & MSBS;
                    let hi = vget_lane_u64::<0>(vreinterpret_u64_u8(hi)) & MSBS;
                    BitMask((((hi as u128) << 64) | lo as u128) & lane_bits(lanes))
                }
            }

            /// Lanes whose stored H2 equals `h2`, ordered or disordered.
            #[inline(always)]
            fn match_h2(self, h2: u8, lanes: usize) -> BitMask {
                // SAFETY: NEON is statically enabled for this build.
                unsafe {
                    let low7 = vdup_n_u8(0x7f);
                    let needle = vdup_n_u8(h2);
                    Self::combine(
                        vceq_u8(vand_u8(self.lo, low7), needle),
                        vceq_u8(vand_u8(self.hi, low7), needle),
                        lanes,
                    )
                }
            }

            /// Lanes holding no value.
            #[inline(always)]
            fn mask_empty(self, lanes: usize) -> BitMask {
                // SAFETY: NEON is statically enabled for this build.
                unsafe {
                    let needle = vdup_n_u8(EMPTY);
                    Self::combine(
                        vceq_u8(self.lo, needle),
                        vceq_u8(self.hi, needle),
                        lanes,
                    )
                }
            }

            /// Lanes holding a value.
            #[inline(always)]
            fn mask_full(self, lanes: usize) -> BitMask {
                BitMask(self.mask_empty(lanes).0 ^ lane_bits(lanes))
            }

            /// Number of consecutive empty lanes at the start of the bin.
            #[inline(always)]
            fn count_leading_empty(self, lanes: usize) -> usize {
                match self.mask_full(lanes).first() {
                    Some(lane) => lane,
                    None => lanes,
                }
            }
        }
    } else {
        type BitMaskWord = u128;
        const BITMASK_SHIFT: u32 = 3;

        const MSBS: u64 = 0x8080_8080_8080_8080;
        const LSBS: u64 = 0x0101_0101_0101_0101;
        const LOW7S: u64 = 0x7f7f_7f7f_7f7f_7f7f;

        #[inline(always)]
        fn lane_bits(lanes: usize) -> BitMaskWord {
            debug_assert!(lanes <= BIN_SLOTS);
            const ALL: u128 = 0x8080_8080_8080_8080_8080_8080_8080_8080;
            ALL >> (8 * (16 - lanes))
        }

        /// One bin's control bytes in two 64-bit words, scanned with
        /// bit-twiddling. Bytes 14 and 15 of the second word are the header
        /// bytes; `lane_bits` drops them.
        #[derive(Clone, Copy)]
        struct Group {
            lo: u64,
            hi: u64,
        }

        impl Group {
            /// Load the control bytes of the bin starting at `ctrl`.
            ///
            /// # Safety
            ///
            /// `ctrl` must be valid for a 16-byte read. Every bin satisfies
            /// this: the slot region begins at offset 16 or later.
            #[inline(always)]
            unsafe fn load(ctrl: *const u8) -> Self {
                // SAFETY: caller guarantees 16 readable bytes; byte reads
                // have no alignment requirement.
                unsafe {
                    Group {
                        lo: u64::from_le_bytes((ctrl as *const [u8; 8]).read_unaligned()),
                        hi: u64::from_le_bytes(
                            (ctrl.add(8) as *const [u8; 8]).read_unaligned(),
                        ),
                    }
                }
            }

            /// Lanes whose stored H2 equals `h2`, ordered or disordered.
            ///
            /// Uses the has-value idiom, so borrow propagation can flag a
            /// false positive on a *full* lane adjacent to a true match; the
            /// equality callback weeds those out. Empty lanes can never be
            /// flagged: `127 ^ h2` has its top bit clear for every valid
            /// `h2`, so the `& !x` term zeroes them.
            #[inline(always)]
            fn match_h2(self, h2: u8, lanes: usize) -> BitMask {
                #[inline(always)]
                fn word_match(word: u64, h2: u8) -> u64 {
                    let x = (word & LOW7S) ^ (LSBS * h2 as u64);
                    x.wrapping_sub(LSBS) & !x & MSBS
                }

                BitMask(
                    (((word_match(self.hi, h2) as u128) << 64)
                        | word_match(self.lo, h2) as u128)
                        & lane_bits(lanes),
                )
            }

            /// Lanes holding no value.
            ///
            /// Exact under the control-byte encoding: a flagged lane needs
            /// `byte ^ 127` to be zero (truly empty) or `0x80` (would
            /// require a stored H2 of 127, which cannot exist).
            #[inline(always)]
            fn mask_empty(self, lanes: usize) -> BitMask {
                #[inline(always)]
                fn word_empty(word: u64) -> u64 {
                    let x = word ^ (LSBS * EMPTY as u64);
                    x.wrapping_sub(LSBS) & !x & MSBS
                }

                BitMask(
                    (((word_empty(self.hi) as u128) << 64) | word_empty(self.lo) as u128)
                        & lane_bits(lanes),
                )
            }

            /// Lanes holding a value.
            #[inline(always)]
            fn mask_full(self, lanes: usize) -> BitMask {
                BitMask(self.mask_empty(lanes).0 ^ lane_bits(lanes))
            }

            /// Number of consecutive empty lanes at the start of the bin.
            #[inline(always)]
            fn count_leading_empty(self, lanes: usize) -> usize {
                match self.mask_full(lanes).first() {
                    Some(lane) => lane,
                    None => lanes,
                }
            }
        }
    }
}

/// A set of lanes within one bin, as produced by a group scan.
///
/// Iteration yields lane indices in ascending order. On the SIMD-128 path
/// each lane is one bit; on the 64-bit paths lanes are 8 bits apart and the
/// index is the trailing-zero count shifted down by 3.
#[derive(Clone, Copy, PartialEq, Eq)]
struct BitMask(BitMaskWord);

impl BitMask {
    #[inline(always)]
    fn any(self) -> bool {
        self.0 != 0
    }

    #[inline(always)]
    fn first(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some((self.0.trailing_zeros() >> BITMASK_SHIFT) as usize)
        }
    }

    /// Highest lane set. Must not be called on an empty mask.
    #[inline(always)]
    fn last(self) -> usize {
        debug_assert!(self.0 != 0);
        ((BitMaskWord::BITS - 1 - self.0.leading_zeros()) >> BITMASK_SHIFT) as usize
    }

    /// Drops all lanes below `lane`.
    #[inline(always)]
    fn clear_below(self, lane: usize) -> Self {
        debug_assert!(lane <= BIN_SLOTS);
        if (lane as u32) << BITMASK_SHIFT >= BitMaskWord::BITS {
            BitMask(0)
        } else {
            BitMask(self.0 & (!0 << ((lane as u32) << BITMASK_SHIFT)))
        }
    }
}

impl Iterator for BitMask {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        let lane = self.first()?;
        self.0 &= self.0 - 1;
        Some(lane)
    }
}

/// Byte offsets of the regions within one bin, for one slot type.
///
/// All cursor movement in the table is `base + bin * bin_size` plus one of
/// these offsets; there is no divide anywhere on the probe path.
#[derive(Clone, Copy, Debug)]
struct BinLayout {
    /// Slot cells in each bin. `BIN_SLOTS`, except for foreshortened
    /// single-bin tables where the requested capacity was smaller.
    slots_per_bin: usize,
    /// Offset of the slot region; at least 16 so group loads stay in-bin.
    slot_offset: usize,
    /// Distance between consecutive bins.
    bin_size: usize,
    /// Alignment of the backing allocation.
    align: usize,
}

impl BinLayout {
    fn new<V>(slots_per_bin: usize) -> Self {
        debug_assert!((1..=BIN_SLOTS).contains(&slots_per_bin));
        let slot_align = mem::align_of::<V>().max(1);
        let slot_offset = align_up(HEADER_OFFSET + HEADER_BYTES, slot_align);
        let bin_size = align_up(
            slot_offset + slots_per_bin * mem::size_of::<V>(),
            slot_align.max(2),
        );
        BinLayout {
            slots_per_bin,
            slot_offset,
            bin_size,
            align: slot_align.max(2),
        }
    }

    /// Allocation layout for `physical_bins` bins, cache-line aligned once
    /// the table has more than a few bins.
    fn alloc_layout(&self, physical_bins: usize) -> Result<Layout, TryReserveError> {
        let size = physical_bins
            .checked_mul(self.bin_size)
            .ok_or(TryReserveError::CapacityOverflow)?;
        let align = if physical_bins > 4 {
            self.align.max(64)
        } else {
            self.align
        };
        Layout::from_size_align(size, align).map_err(|_| TryReserveError::CapacityOverflow)
    }
}

/// The shared backing for tables that have not allocated: one bin of empty
/// control bytes with the last-bin flag set and a search distance of zero.
/// It is never written; it has no slot region, and no probe can select a
/// lane in it because every lane reads empty and `growth_left` is zero.
#[repr(C, align(16))]
struct EmptyBin {
    ctrl: [u8; BIN_SLOTS],
    header: u16,
}

static EMPTY_BIN: EmptyBin = EmptyBin {
    ctrl: [EMPTY; BIN_SLOTS],
    header: LAST_BIN_FLAG,
};

#[inline(always)]
fn empty_bins() -> NonNull<u8> {
    NonNull::from(&EMPTY_BIN).cast::<u8>()
}

cfg_if! {
    if #[cfg(feature = "generations")] {
        use core::cell::Cell;

        /// Monotonic counter bumped by every operation that can move slots.
        /// Boxed so the address outlives resizes; iterators snapshot the
        /// value and re-check it on every access.
        struct GenerationState {
            counter: Box<Cell<u8>>,
        }

        impl GenerationState {
            fn new() -> Self {
                GenerationState {
                    counter: Box::new(Cell::new(0)),
                }
            }

            #[inline(always)]
            fn bump(&self) {
                self.counter.set(self.counter.get().wrapping_add(1));
            }

            #[inline(always)]
            fn snapshot(&self) -> IterGeneration {
                IterGeneration {
                    counter: &*self.counter,
                    generation: self.counter.get(),
                }
            }
        }

        /// An iterator's view of the generation counter.
        #[derive(Clone, Copy)]
        struct IterGeneration {
            counter: *const Cell<u8>,
            generation: u8,
        }

        impl IterGeneration {
            fn dangling() -> Self {
                IterGeneration {
                    counter: ptr::null(),
                    generation: 0,
                }
            }

            /// # Safety
            ///
            /// The table this snapshot was taken from must still be alive.
            #[inline(always)]
            unsafe fn check(&self, operation: &str) {
                if !self.counter.is_null() {
                    // SAFETY: caller guarantees the owning table (and with it
                    // the boxed counter) is alive.
                    let current = unsafe { (*self.counter).get() };
                    if current != self.generation {
                        panic!(
                            "{operation} called on invalid iterator: the table could have \
                             rehashed since this iterator was initialized"
                        );
                    }
                }
            }
        }
    } else {
        #[derive(Clone, Copy)]
        struct GenerationState;

        impl GenerationState {
            fn new() -> Self {
                GenerationState
            }

            #[inline(always)]
            fn bump(&self) {}

            #[inline(always)]
            fn snapshot(&self) -> IterGeneration {
                IterGeneration
            }
        }

        #[derive(Clone, Copy)]
        struct IterGeneration;

        impl IterGeneration {
            fn dangling() -> Self {
                IterGeneration
            }

            #[inline(always)]
            unsafe fn check(&self, _operation: &str) {}
        }
    }
}

/// Sampling hook for table events.
///
/// The default implementation of every method is a no-op, so a standalone
/// table pays nothing. Tests and instrumented deployments install a
/// recorder with [`HashTable::set_telemetry`] to observe insert probe
/// lengths, rehash cost, and storage changes.
pub trait Telemetry {
    /// A value was inserted after probing `probe_length` bins past its
    /// preferred bin.
    fn record_insert(&self, hash: u64, probe_length: usize) {
        let _ = (hash, probe_length);
    }

    /// The table was rehashed; `total_probe_length` sums the placement
    /// probes of every moved element.
    fn record_rehash(&self, total_probe_length: usize) {
        let _ = total_probe_length;
    }

    /// The backing storage changed size.
    fn record_storage_changed(&self, size: usize, capacity: usize) {
        let _ = (size, capacity);
    }

    /// `reserve` planned room for `requested` elements.
    fn record_reservation(&self, requested: usize) {
        let _ = requested;
    }
}

/// The error returned by the fallible reservation APIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TryReserveError {
    /// The requested capacity exceeded the implementation limit or the
    /// backing-size arithmetic overflowed.
    CapacityOverflow,
    /// The allocator refused the backing array.
    AllocError {
        /// The layout that could not be allocated.
        layout: Layout,
    },
}

impl TryReserveError {
    #[cold]
    fn fail(self) -> ! {
        match self {
            TryReserveError::CapacityOverflow => panic!("capacity overflow in hash table"),
            TryReserveError::AllocError { layout } => handle_alloc_error(layout),
        }
    }
}

impl fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryReserveError::CapacityOverflow => {
                f.write_str("requested capacity exceeded the hash table's limits")
            }
            TryReserveError::AllocError { .. } => {
                f.write_str("the allocator could not provide the requested backing array")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TryReserveError {}

/// Load-factor policy and probe tweaks for a table.
///
/// `full_numerator / full_denominator` is the live-entry density that forces
/// a resize on insert. `rehashed_numerator / rehashed_denominator` is the
/// density a rehash targets, which determines how much slack (and therefore
/// how many insertions) the table has before the next rehash is forced.
/// Density is measured against every allocated slot, including the tail
/// bins. Tables with different configs holding the same elements still
/// compare equal through the map/set wrappers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Numerator of the density that forces a resize (default 7).
    pub full_numerator: usize,
    /// Denominator of the density that forces a resize (default 8).
    pub full_denominator: usize,
    /// Numerator of the post-rehash target density (default 7).
    pub rehashed_numerator: usize,
    /// Denominator of the post-rehash target density (default 16).
    pub rehashed_denominator: usize,
    /// Occasionally insert into the highest empty lane of the target bin
    /// instead of the lowest, adding entropy to iteration order. Ignored in
    /// single-bin tables (default off).
    pub backwards_insert_fuzz: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            full_numerator: 7,
            full_denominator: 8,
            rehashed_numerator: 7,
            rehashed_denominator: 16,
            backwards_insert_fuzz: false,
        }
    }
}

impl Config {
    fn assert_valid(&self) {
        assert!(
            self.full_numerator >= 1 && self.full_numerator <= self.full_denominator,
            "full utilization must be a ratio in (0, 1]"
        );
        assert!(
            self.rehashed_numerator >= 1
                && self.rehashed_numerator <= self.rehashed_denominator,
            "rehashed utilization must be a ratio in (0, 1]"
        );
        assert!(
            (self.rehashed_numerator as u128) * (self.full_denominator as u128)
                <= (self.full_numerator as u128) * (self.rehashed_denominator as u128),
            "rehashed utilization must not exceed full utilization"
        );
    }

    /// Live entries permitted in `total_slots` before insert forces a
    /// resize. Single-bin tables may fill completely.
    fn full_capacity(&self, total_slots: usize, small: bool) -> usize {
        if small {
            total_slots
        } else {
            ((total_slots as u128 * self.full_numerator as u128)
                / self.full_denominator as u128) as usize
        }
    }

    /// Logical bins needed to hold `size` elements at the given ratio.
    fn bin_count_for_load(size: usize, numerator: usize, denominator: usize) -> usize {
        if size == 0 {
            0
        } else if size <= BIN_SLOTS {
            // One bin never probes, so it may run at full density.
            1
        } else {
            let want = size as u128 * denominator as u128;
            let per_bin = BIN_SLOTS as u128 * numerator as u128;
            ((want + per_bin - 1) / per_bin) as usize
        }
    }

    fn bins_for_rehash(&self, size: usize) -> usize {
        Self::bin_count_for_load(size, self.rehashed_numerator, self.rehashed_denominator)
    }

    fn bins_for_reserve(&self, size: usize) -> usize {
        Self::bin_count_for_load(size, self.full_numerator, self.full_denominator)
    }
}

/// Tail bins appended past the logical range so that probes overflowing the
/// final logical bins rarely need to wrap (wrapped entries must be marked
/// disordered).
fn physical_bin_count(logical_bins: usize) -> usize {
    if logical_bins <= 1 {
        logical_bins
    } else {
        logical_bins + (logical_bins - 1).min(MAX_TAIL_BINS)
    }
}

/// Where an empty-slot probe landed.
struct ProbeTarget {
    bin: usize,
    lane: usize,
    probe_length: usize,
    wrapped: bool,
}

/// A disordered element lifted out of the source table during a rehash,
/// ordered by its full hash for the merge heap.
struct Spilled<V> {
    hash: u64,
    value: V,
}

impl<V> PartialEq for Spilled<V> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl<V> Eq for Spilled<V> {}

impl<V> PartialOrd for Spilled<V> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<V> Ord for Spilled<V> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.hash.cmp(&other.hash)
    }
}

cfg_if! {
    if #[cfg(all(feature = "std", unix))] {
        /// Only backing arrays at least this large are worth advising the
        /// OS about.
        const RELEASE_MIN_BYTES: usize = 1 << 20;
        const PAGE_SIZE: usize = 4096;

        /// Hands fully-consumed source pages back to the OS during a rehash
        /// so the old and new arrays don't both stay resident. Only spans
        /// strictly inside the allocation are touched, and errors are
        /// ignored; the pages read back as zero afterwards, so the caller
        /// must treat the released prefix as garbage.
        fn release_consumed_pages(
            base: *mut u8,
            consumed_bytes: usize,
            total_bytes: usize,
            released: &mut usize,
        ) {
            if total_bytes < RELEASE_MIN_BYTES {
                return;
            }
            let start = align_up(base as usize + *released, PAGE_SIZE);
            let end = (base as usize + consumed_bytes) & !(PAGE_SIZE - 1);
            if end <= start || end > base as usize + total_bytes {
                return;
            }
            // SAFETY: the span is page-aligned and strictly inside our own
            // allocation, so no other allocation shares these pages.
            unsafe {
                libc::madvise(start as *mut libc::c_void, end - start, libc::MADV_DONTNEED);
            }
            *released = end - base as usize;
        }

        /// Unwind protection for the release optimisation: if a hash
        /// callback panics after pages were released, the zero-filled
        /// control bytes in the prefix would read as full slots. This guard
        /// rewrites them as empty (every bin in the prefix was fully
        /// consumed before its pages were released).
        struct ReleasedPrefixGuard {
            base: *mut u8,
            bin_size: usize,
            physical_bins: usize,
            released: usize,
        }

        impl Drop for ReleasedPrefixGuard {
            fn drop(&mut self) {
                if self.released == 0 {
                    return;
                }
                let touched = ((self.released + self.bin_size - 1) / self.bin_size)
                    .min(self.physical_bins);
                for bin in 0..touched {
                    // SAFETY: `base` is the live source allocation and `bin`
                    // is in range; faulting the zero pages back in and
                    // rewriting the metadata is exactly the repair needed.
                    unsafe {
                        let bin_ptr = self.base.add(bin * self.bin_size);
                        ptr::write_bytes(bin_ptr, EMPTY, BIN_SLOTS);
                        let last = bin == self.physical_bins - 1;
                        (bin_ptr.add(HEADER_OFFSET) as *mut u16)
                            .write(if last { LAST_BIN_FLAG } else { 0 });
                    }
                }
            }
        }
    }
}

/// A hash table using graveyard hashing.
///
/// `HashTable<V>` stores values of type `V` and provides fast insertion,
/// lookup, and removal. Unlike standard hash maps, every operation takes the
/// hash value and an equality predicate (and, where the table may resize, a
/// re-hash function) from the caller.
///
/// ## Performance characteristics
///
/// - **Memory**: one control byte per slot plus the slot itself, at a
///   resize threshold of 7/8 full by default.
/// - **Lookups**: bounded by the origin bin's search distance; one SIMD
///   compare per probed bin.
pub struct HashTable<V> {
    layout: BinLayout,
    bins: NonNull<u8>,
    logical_bins: usize,
    physical_bins: usize,
    /// Total allocated slots, including tail bins. Zero iff unallocated.
    cap_slots: usize,
    size: usize,
    growth_left: usize,
    config: Config,
    generation: GenerationState,
    telemetry: Option<Box<dyn Telemetry>>,
    _phantom: PhantomData<V>,
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("size", &self.size)
            .field("capacity", &self.cap_slots)
            .field("logical_bins", &self.logical_bins)
            .field("physical_bins", &self.physical_bins)
            .field("growth_left", &self.growth_left)
            .finish()
    }
}

impl<V> Drop for HashTable<V> {
    fn drop(&mut self) {
        // SAFETY: the control bytes exactly describe which slots hold
        // initialized values, and the allocation matches `alloc_layout` of
        // the current bin counts.
        unsafe {
            self.destroy_slots();
            if self.cap_slots != 0 {
                let layout = self
                    .layout
                    .alloc_layout(self.physical_bins)
                    .expect("layout was validated at allocation");
                alloc::alloc::dealloc(self.bins.as_ptr(), layout);
            }
        }
    }
}

impl<V: Clone> Clone for HashTable<V> {
    fn clone(&self) -> Self {
        if self.cap_slots == 0 {
            return Self::empty_with_config(self.config);
        }

        let mut new_table =
            match Self::try_with_bins(self.logical_bins, self.layout.slots_per_bin, self.config)
            {
                Ok(table) => table,
                Err(err) => err.fail(),
            };

        // Copy the headers wholesale, then clone slot-by-slot, publishing
        // each control byte only after its value is written so a panicking
        // `Clone` leaves the new table consistent. The copied headers keep
        // the search distances, so the clone probes identically.
        unsafe {
            for bin in 0..self.physical_bins {
                let header = self.header(bin);
                new_table.set_header(bin, header);
                let full = self.group(bin).mask_full(self.layout.slots_per_bin);
                for lane in full {
                    let value = (*self.slot_ptr(bin, lane)).clone();
                    new_table.slot_ptr(bin, lane).write(value);
                    new_table.set_ctrl(bin, lane, self.ctrl(bin, lane));
                    new_table.size += 1;
                }
            }
        }

        debug_assert_eq!(new_table.size, self.size);
        new_table.growth_left = self.growth_left;
        new_table
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with the default [`Config`].
    ///
    /// No memory is allocated until the first insertion.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an empty table with the given load-factor policy.
    ///
    /// # Panics
    ///
    /// Panics if the config's ratios are not in `(0, 1]` or the rehashed
    /// ratio exceeds the full ratio.
    pub fn with_config(config: Config) -> Self {
        config.assert_valid();
        Self::empty_with_config(config)
    }

    /// Creates a table that can hold at least `capacity` elements without
    /// resizing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_config(capacity, Config::default())
    }

    /// Creates a table with the given capacity and load-factor policy.
    ///
    /// Requests smaller than one bin are allocated foreshortened: a single
    /// bin whose slot region holds exactly `capacity` cells.
    ///
    /// # Panics
    ///
    /// Panics on an invalid config or a capacity beyond the implementation
    /// limit; aborts on allocation failure.
    pub fn with_capacity_and_config(capacity: usize, config: Config) -> Self {
        config.assert_valid();
        if capacity == 0 {
            return Self::empty_with_config(config);
        }
        let (logical_bins, single_bin_slots) = if capacity <= BIN_SLOTS {
            (1, capacity)
        } else {
            (config.bins_for_reserve(capacity), BIN_SLOTS)
        };
        match Self::try_with_bins(logical_bins, single_bin_slots, config) {
            Ok(table) => table,
            Err(err) => err.fail(),
        }
    }

    fn empty_with_config(config: Config) -> Self {
        HashTable {
            layout: BinLayout::new::<V>(BIN_SLOTS),
            bins: empty_bins(),
            logical_bins: 0,
            physical_bins: 1,
            cap_slots: 0,
            size: 0,
            growth_left: 0,
            config,
            generation: GenerationState::new(),
            telemetry: None,
            _phantom: PhantomData,
        }
    }

    /// Allocates and initializes a table of `logical_bins` bins.
    /// `single_bin_slots` is the foreshortened slot count used when the
    /// table is a single bin.
    fn try_with_bins(
        logical_bins: usize,
        single_bin_slots: usize,
        config: Config,
    ) -> Result<Self, TryReserveError> {
        debug_assert!(logical_bins > 0);
        let slots_per_bin = if logical_bins == 1 {
            single_bin_slots
        } else {
            BIN_SLOTS
        };
        let physical_bins = physical_bin_count(logical_bins);
        let total_slots = physical_bins as u128 * slots_per_bin as u128;
        if total_slots > MAX_SLOTS {
            return Err(TryReserveError::CapacityOverflow);
        }
        let total_slots = total_slots as usize;

        let layout = BinLayout::new::<V>(slots_per_bin);
        let alloc_layout = layout.alloc_layout(physical_bins)?;
        debug_assert!(alloc_layout.size() > 0);
        // SAFETY: the layout is non-zero sized; a null return is reported as
        // an allocation error rather than dereferenced.
        let bins = unsafe {
            let raw = alloc::alloc::alloc(alloc_layout);
            let Some(bins) = NonNull::new(raw) else {
                return Err(TryReserveError::AllocError {
                    layout: alloc_layout,
                });
            };
            init_bins(bins.as_ptr(), &layout, physical_bins);
            bins
        };

        let small = logical_bins <= 1;
        Ok(HashTable {
            layout,
            bins,
            logical_bins,
            physical_bins,
            cap_slots: total_slots,
            size: 0,
            growth_left: config.full_capacity(total_slots, small),
            config,
            generation: GenerationState::new(),
            telemetry: None,
            _phantom: PhantomData,
        })
    }

    /// Returns the number of elements in the table.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the total number of allocated slots.
    pub fn capacity(&self) -> usize {
        self.cap_slots
    }

    /// Returns the ratio of live elements to allocated slots.
    pub fn load_factor(&self) -> f32 {
        if self.cap_slots == 0 {
            0.0
        } else {
            self.size as f32 / self.cap_slots as f32
        }
    }

    /// Insertions remaining before the next insert forces a rehash.
    ///
    /// Erasing does not give insertions back: the budget bounds how far the
    /// table may drift from its rehashed layout, not how full it is.
    pub fn growth_left(&self) -> usize {
        self.growth_left
    }

    /// Returns the table's load-factor policy.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Installs a sampling hook, replacing any previous one.
    pub fn set_telemetry(&mut self, telemetry: Box<dyn Telemetry>) {
        self.telemetry = Some(telemetry);
    }

    #[inline(always)]
    fn note<F: FnOnce(&dyn Telemetry)>(&self, f: F) {
        if let Some(telemetry) = &self.telemetry {
            f(&**telemetry);
        }
    }

    #[inline(always)]
    fn small(&self) -> bool {
        self.logical_bins <= 1
    }

    /// Pointer to the start of `bin`.
    ///
    /// # Safety
    ///
    /// `bin` must be below `physical_bins`. On an unallocated table only
    /// bin 0 (the shared sentinel) exists, and it must not be written.
    #[inline(always)]
    unsafe fn bin_ptr(&self, bin: usize) -> *mut u8 {
        debug_assert!(bin < self.physical_bins);
        // SAFETY: caller keeps `bin` in range, so the offset stays inside
        // the allocation (or the 16-byte sentinel).
        unsafe { self.bins.as_ptr().add(bin * self.layout.bin_size) }
    }

    /// # Safety
    ///
    /// `bin` must be below `physical_bins`.
    #[inline(always)]
    unsafe fn header(&self, bin: usize) -> u16 {
        // SAFETY: bins are at least 2-aligned and the header lies at an even
        // offset inside the bin.
        unsafe { (self.bin_ptr(bin).add(HEADER_OFFSET) as *const u16).read() }
    }

    /// # Safety
    ///
    /// `bin` must be below `physical_bins` and the table must be allocated.
    #[inline(always)]
    unsafe fn set_header(&mut self, bin: usize, header: u16) {
        debug_assert!(self.cap_slots != 0);
        // SAFETY: as for `header`, plus the caller guarantees this is not
        // the read-only sentinel.
        unsafe { (self.bin_ptr(bin).add(HEADER_OFFSET) as *mut u16).write(header) }
    }

    /// # Safety
    ///
    /// `bin` must be below `physical_bins`.
    #[inline(always)]
    unsafe fn search_distance(&self, bin: usize) -> usize {
        // SAFETY: forwarded to `header`.
        unsafe { (self.header(bin) >> 1) as usize }
    }

    /// Raises `bin`'s search distance to at least `candidate`, saturating
    /// at the 15-bit header limit. Reads clamp the window to the physical
    /// bin count, so saturation only matters for implausibly long chains.
    ///
    /// # Safety
    ///
    /// `bin` must be below `physical_bins` and the table must be allocated.
    #[inline(always)]
    unsafe fn widen_search_distance(&mut self, bin: usize, candidate: usize) {
        // SAFETY: forwarded to `header`/`set_header`.
        unsafe {
            let header = self.header(bin);
            if candidate > (header >> 1) as usize {
                let clamped = candidate.min(SEARCH_DISTANCE_MAX) as u16;
                self.set_header(bin, (header & LAST_BIN_FLAG) | (clamped << 1));
            }
        }
    }

    /// # Safety
    ///
    /// `bin` below `physical_bins`, `lane` below `slots_per_bin`.
    #[inline(always)]
    unsafe fn ctrl(&self, bin: usize, lane: usize) -> u8 {
        debug_assert!(lane < self.layout.slots_per_bin);
        // SAFETY: caller keeps both indices in range.
        unsafe { *self.bin_ptr(bin).add(lane) }
    }

    /// # Safety
    ///
    /// `bin` below `physical_bins`, `lane` below `slots_per_bin`, table
    /// allocated.
    #[inline(always)]
    unsafe fn set_ctrl(&mut self, bin: usize, lane: usize, ctrl: u8) {
        debug_assert!(lane < self.layout.slots_per_bin);
        // SAFETY: caller keeps both indices in range and guarantees this is
        // not the read-only sentinel.
        unsafe { *self.bin_ptr(bin).add(lane) = ctrl }
    }

    /// # Safety
    ///
    /// `bin` below `physical_bins`, `lane` below `slots_per_bin`, table
    /// allocated. The slot is only initialized if its control byte is full.
    #[inline(always)]
    unsafe fn slot_ptr(&self, bin: usize, lane: usize) -> *mut V {
        debug_assert!(self.cap_slots != 0);
        debug_assert!(lane < self.layout.slots_per_bin);
        // SAFETY: caller keeps both indices in range.
        unsafe {
            self.bin_ptr(bin)
                .add(self.layout.slot_offset + lane * mem::size_of::<V>()) as *mut V
        }
    }

    /// # Safety
    ///
    /// `bin` must be below `physical_bins`.
    #[inline(always)]
    unsafe fn group(&self, bin: usize) -> Group {
        // SAFETY: every bin (and the sentinel) has at least 16 readable
        // bytes at its control region.
        unsafe { Group::load(self.bin_ptr(bin)) }
    }

    /// Walks the search window of `hash`'s preferred bin, calling `eq` on
    /// every H2 match, and returns the first hit's position.
    #[inline]
    fn probe_find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<(usize, usize)> {
        let mut bin = h1(hash, self.logical_bins);
        let h2 = h2(hash);
        // One header read bounds the whole scan: inserts only ever widen
        // the distance, so anything stored for this preferred bin is inside
        // the window.
        let window = unsafe { self.search_distance(bin) }.min(self.physical_bins);
        for _ in 0..window {
            // SAFETY: `bin` wraps at `physical_bins` below, so it stays in
            // range; matched lanes are full (empty bytes cannot match an
            // H2), so the slot is initialized.
            unsafe {
                let group = self.group(bin);
                for lane in group.match_h2(h2, self.layout.slots_per_bin) {
                    if eq(&*self.slot_ptr(bin, lane)) {
                        return Some((bin, lane));
                    }
                }
            }
            bin += 1;
            if bin == self.physical_bins {
                bin = 0;
            }
        }
        None
    }

    /// Finds the first empty lane probing linearly from `hash`'s preferred
    /// bin.
    ///
    /// # Safety
    ///
    /// The table must be allocated and hold at least one empty slot
    /// (guaranteed whenever `growth_left > 0`, and by construction during a
    /// rehash).
    unsafe fn find_first_empty(&self, hash: u64, fuzz: bool) -> ProbeTarget {
        debug_assert!(self.cap_slots != 0);
        let mut bin = h1(hash, self.logical_bins);
        let mut probe_length = 0;
        let mut wrapped = false;
        loop {
            // SAFETY: `bin` wraps at `physical_bins`, so it stays in range.
            let empties = unsafe { self.group(bin) }.mask_empty(self.layout.slots_per_bin);
            if empties.any() {
                let lane = if fuzz && should_insert_backwards(hash) {
                    empties.last()
                } else {
                    // `first` is not `None`: `any` was true.
                    empties.first().unwrap()
                };
                return ProbeTarget {
                    bin,
                    lane,
                    probe_length,
                    wrapped,
                };
            }
            probe_length += 1;
            debug_assert!(
                probe_length <= self.physical_bins,
                "probe found no empty slot"
            );
            bin += 1;
            if bin == self.physical_bins {
                bin = 0;
                wrapped = true;
            }
        }
    }

    /// Finds a value by hash and equality predicate.
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        if self.size == 0 {
            return None;
        }
        let (bin, lane) = self.probe_find(hash, eq)?;
        // SAFETY: `probe_find` only returns full, in-range positions.
        Some(unsafe { &*self.slot_ptr(bin, lane) })
    }

    /// Finds a value by hash and equality predicate, returning a mutable
    /// reference.
    ///
    /// The parts of the value that determine its hash and equality must not
    /// be modified through the reference.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        if self.size == 0 {
            return None;
        }
        let (bin, lane) = self.probe_find(hash, eq)?;
        // SAFETY: `probe_find` only returns full, in-range positions.
        Some(unsafe { &mut *self.slot_ptr(bin, lane) })
    }

    /// Removes and returns the value matching `hash` and `eq`, if any.
    ///
    /// The slot's control byte returns to empty; the origin bin's search
    /// distance and the growth budget are deliberately left alone. The next
    /// rehash tightens both.
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        if self.size == 0 {
            return None;
        }
        let (bin, lane) = self.probe_find(hash, eq)?;
        // SAFETY: `probe_find` only returns full, in-range positions; the
        // value is read out exactly once and the lane is marked empty.
        unsafe {
            let value = self.slot_ptr(bin, lane).read();
            self.set_ctrl(bin, lane, EMPTY);
            self.size -= 1;
            Some(value)
        }
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// On a miss, the returned [`VacantEntry`] has already located (and, if
    /// the growth budget was spent, rehashed to create) a viable empty slot;
    /// inserting into it cannot fail.
    ///
    /// # Arguments
    ///
    /// * `hash` - the hash of the key being looked up
    /// * `eq` - predicate identifying a matching value
    /// * `rehash` - recomputes the hash of a stored value; used when the
    ///   table must grow
    #[inline]
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        rehash: impl Fn(&V) -> u64,
    ) -> Entry<'_, V> {
        if self.size != 0 {
            if let Some((bin, lane)) = self.probe_find(hash, &eq) {
                return Entry::Occupied(OccupiedEntry {
                    table: self,
                    bin,
                    lane,
                });
            }
        }

        if self.growth_left == 0 {
            self.grow_for_insert(&rehash);
        }
        let fuzz = self.config.backwards_insert_fuzz && !self.small();
        // SAFETY: growth was just ensured, so an empty slot exists.
        let target = unsafe { self.find_first_empty(hash, fuzz) };
        Entry::Vacant(VacantEntry {
            table: self,
            hash,
            bin: target.bin,
            lane: target.lane,
            probe_length: target.probe_length,
        })
    }

    #[cold]
    #[inline(never)]
    fn grow_for_insert(&mut self, rehash: &dyn Fn(&V) -> u64) {
        // `size + 1` admits the insertion that spent the budget; sizing for
        // `size` alone could re-derive the same single bin in small mode.
        self.rehash_to_size(self.size + 1, rehash);
    }

    fn rehash_to_size(&mut self, target: usize, rehash: &dyn Fn(&V) -> u64) {
        let logical_bins = self.config.bins_for_rehash(target.max(1));
        if let Err(err) = self.try_resize_to_bins(logical_bins, rehash) {
            err.fail();
        }
    }

    /// Rebuilds the table into a fresh backing array of `logical_bins`
    /// bins, restoring the hash-order layout. Allocation happens before any
    /// element moves, so failure leaves the table untouched.
    fn try_resize_to_bins(
        &mut self,
        logical_bins: usize,
        rehash: &dyn Fn(&V) -> u64,
    ) -> Result<(), TryReserveError> {
        let mut fresh = Self::try_with_bins(logical_bins, BIN_SLOTS, self.config)?;
        let total_probe_length = if self.size > 0 {
            self.merge_into(&mut fresh, rehash)
        } else {
            0
        };

        mem::swap(&mut self.layout, &mut fresh.layout);
        mem::swap(&mut self.bins, &mut fresh.bins);
        mem::swap(&mut self.logical_bins, &mut fresh.logical_bins);
        mem::swap(&mut self.physical_bins, &mut fresh.physical_bins);
        mem::swap(&mut self.cap_slots, &mut fresh.cap_slots);
        mem::swap(&mut self.size, &mut fresh.size);
        // `fresh` now owns the drained old backing (size zero, all control
        // bytes empty) and releases it on drop.

        self.growth_left = self
            .config
            .full_capacity(self.cap_slots, self.small())
            .saturating_sub(self.size);
        self.generation.bump();
        self.note(|t| {
            t.record_rehash(total_probe_length);
            t.record_storage_changed(self.size, self.cap_slots);
        });
        Ok(())
    }

    /// Moves every element of `self` into `dst` in ascending hash order.
    ///
    /// Ordered elements stream in storage order, which is already hash
    /// order. Disordered elements are harvested into a min-heap ahead of
    /// the cursor: when the cursor enters bin `b`, everything within `b`'s
    /// search window has been lifted, which covers every element whose
    /// preferred bin is at or before `b` (including wrapped ones, which sit
    /// before their preferred bin and were passed earlier). Size counters
    /// are kept exact per element so a panicking hash callback leaves both
    /// tables consistent.
    fn merge_into(&mut self, dst: &mut Self, rehash: &dyn Fn(&V) -> u64) -> usize {
        let physical_bins = self.physical_bins;
        let slots = self.layout.slots_per_bin;
        let mut heap: BinaryHeap<Reverse<Spilled<V>>> = BinaryHeap::new();
        let mut frontier = 0usize;
        let mut total_probe_length = 0usize;

        #[cfg(all(feature = "std", unix))]
        let total_bytes = physical_bins * self.layout.bin_size;
        #[cfg(all(feature = "std", unix))]
        let mut guard = ReleasedPrefixGuard {
            base: self.bins.as_ptr(),
            bin_size: self.layout.bin_size,
            physical_bins,
            released: 0,
        };

        for bin in 0..physical_bins {
            // Extend the harvest out to this bin's search window so every
            // disordered element that could precede the ordered stream is
            // in the heap before we emit from this bin.
            let window = unsafe { self.search_distance(bin) };
            let window_end = (bin + 1).max(bin.saturating_add(window)).min(physical_bins);
            while frontier < window_end {
                for lane in 0..slots {
                    // SAFETY: `frontier` and `lane` are in range; a full
                    // control byte marks an initialized slot, which is read
                    // out exactly once and marked empty.
                    unsafe {
                        let ctrl = self.ctrl(frontier, lane);
                        if is_full_ctrl(ctrl) && is_disordered_ctrl(ctrl) {
                            let value = self.slot_ptr(frontier, lane).read();
                            self.set_ctrl(frontier, lane, EMPTY);
                            self.size -= 1;
                            let hash = rehash(&value);
                            heap.push(Reverse(Spilled { hash, value }));
                        }
                    }
                }
                frontier += 1;
            }

            for lane in 0..slots {
                // SAFETY: as above.
                unsafe {
                    let ctrl = self.ctrl(bin, lane);
                    if !is_full_ctrl(ctrl) {
                        continue;
                    }
                    debug_assert!(
                        !is_disordered_ctrl(ctrl),
                        "disordered slot escaped harvest"
                    );
                    let value = self.slot_ptr(bin, lane).read();
                    self.set_ctrl(bin, lane, EMPTY);
                    self.size -= 1;
                    let hash = rehash(&value);
                    while heap
                        .peek()
                        .is_some_and(|Reverse(spilled)| spilled.hash < hash)
                    {
                        let Reverse(spilled) = heap.pop().unwrap();
                        total_probe_length += dst.place_rehashed(spilled.hash, spilled.value);
                    }
                    total_probe_length += dst.place_rehashed(hash, value);
                }
            }

            #[cfg(all(feature = "std", unix))]
            release_consumed_pages(
                guard.base,
                (bin + 1) * self.layout.bin_size,
                total_bytes,
                &mut guard.released,
            );
        }

        while let Some(Reverse(spilled)) = heap.pop() {
            // SAFETY: `dst` was sized for every element of `self`.
            total_probe_length += unsafe { dst.place_rehashed(spilled.hash, spilled.value) };
        }

        // Success: the drained source is about to be thrown away, so the
        // released prefix needs no repair.
        #[cfg(all(feature = "std", unix))]
        {
            guard.released = 0;
        }

        debug_assert_eq!(self.size, 0);
        total_probe_length
    }

    /// Places one element during a rehash. Written ordered unless the probe
    /// wrapped past the physical end; lanes fill lowest-first so the scan
    /// order of ordered elements stays sorted by hash.
    ///
    /// # Safety
    ///
    /// `self` must have at least one empty slot.
    unsafe fn place_rehashed(&mut self, hash: u64, value: V) -> usize {
        // SAFETY: forwarded precondition.
        let target = unsafe { self.find_first_empty(hash, false) };
        let h2 = h2(hash);
        let ctrl = if target.wrapped {
            disordered_ctrl(h2)
        } else {
            ordered_ctrl(h2)
        };
        // SAFETY: the target is an empty, in-range lane of an allocated
        // table.
        unsafe {
            self.slot_ptr(target.bin, target.lane).write(value);
            self.set_ctrl(target.bin, target.lane, ctrl);
            let origin = h1(hash, self.logical_bins);
            self.widen_search_distance(origin, target.probe_length + 1);
        }
        self.size += 1;
        target.probe_length
    }

    /// Reserves capacity for at least `additional` more elements, rehashing
    /// into a larger array if the current growth budget cannot cover them.
    ///
    /// After a reserving resize the growth budget is exactly the
    /// reservation, so the disordered population stays within what was
    /// planned for.
    pub fn reserve(&mut self, additional: usize, rehash: impl Fn(&V) -> u64) {
        if let Err(err) = self.try_reserve(additional, rehash) {
            err.fail();
        }
    }

    /// Fallible [`reserve`](Self::reserve): errors are returned instead of
    /// panicking or aborting, and the table is left untouched on failure.
    pub fn try_reserve(
        &mut self,
        additional: usize,
        rehash: impl Fn(&V) -> u64,
    ) -> Result<(), TryReserveError> {
        let required = self.size.saturating_add(additional);
        if required <= self.size + self.growth_left {
            return Ok(());
        }
        let logical_bins = self.config.bins_for_reserve(required);
        self.try_resize_to_bins(logical_bins, &rehash)?;
        self.growth_left = required - self.size;
        self.note(|t| t.record_reservation(required));
        Ok(())
    }

    /// Rehashes the table.
    ///
    /// With `n == 0` the table is rebuilt unconditionally (restoring the
    /// hash-order layout and resetting the growth budget), or deallocated
    /// entirely if it is also empty. Otherwise the table is rebuilt only if
    /// `n` exceeds the current capacity.
    pub fn rehash(&mut self, n: usize, rehash: impl Fn(&V) -> u64) {
        if n == 0 {
            if self.cap_slots == 0 {
                return;
            }
            if self.size == 0 {
                // SAFETY: the table is empty, so dropping straight to the
                // sentinel loses nothing.
                unsafe { self.deallocate() };
                self.generation.bump();
                self.note(|t| t.record_storage_changed(0, 0));
                return;
            }
            self.rehash_to_size(self.size, &rehash);
            return;
        }
        if n > self.cap_slots {
            let logical_bins = (n / BIN_SLOTS + usize::from(n % BIN_SLOTS != 0)).max(1);
            if let Err(err) = self.try_resize_to_bins(logical_bins, &rehash) {
                err.fail();
            }
        }
    }

    /// Shrinks the backing array to fit the current size, or deallocates an
    /// empty table entirely.
    pub fn shrink_to_fit(&mut self, rehash: impl Fn(&V) -> u64) {
        if self.size == 0 {
            if self.cap_slots != 0 {
                // SAFETY: no live elements.
                unsafe { self.deallocate() };
                self.generation.bump();
                self.note(|t| t.record_storage_changed(0, 0));
            }
            return;
        }
        let logical_bins = self.config.bins_for_reserve(self.size);
        if logical_bins < self.logical_bins {
            if let Err(err) = self.try_resize_to_bins(logical_bins, &rehash) {
                err.fail();
            }
        }
    }

    /// Removes all elements.
    ///
    /// Small allocations are kept and their metadata reset; large ones are
    /// returned to the allocator so a cleared table doesn't pin a large
    /// footprint.
    pub fn clear(&mut self) {
        if self.cap_slots == 0 {
            return;
        }
        // SAFETY: control bytes describe the initialized slots.
        unsafe {
            self.destroy_slots();
        }
        self.size = 0;
        if self.cap_slots < CLEAR_REUSE_MAX_SLOTS {
            // SAFETY: allocation is live and sized for `physical_bins`.
            unsafe {
                init_bins(self.bins.as_ptr(), &self.layout, self.physical_bins);
            }
            self.growth_left = self.config.full_capacity(self.cap_slots, self.small());
        } else {
            // SAFETY: all slots were just destroyed.
            unsafe { self.deallocate() };
        }
        self.generation.bump();
        self.note(|t| t.record_storage_changed(0, self.cap_slots));
    }

    /// Drops every live value. Leaves the control bytes untouched; callers
    /// reset or deallocate immediately after.
    ///
    /// # Safety
    ///
    /// Control bytes must accurately describe slot initialization. After
    /// this call they no longer do, until the caller resets them.
    unsafe fn destroy_slots(&mut self) {
        if !mem::needs_drop::<V>() || self.size == 0 {
            return;
        }
        for bin in 0..self.physical_bins {
            // SAFETY: indices in range; full lanes hold initialized values.
            unsafe {
                let full = self.group(bin).mask_full(self.layout.slots_per_bin);
                for lane in full {
                    ptr::drop_in_place(self.slot_ptr(bin, lane));
                }
            }
        }
    }

    /// Returns the backing array to the allocator and points the table at
    /// the shared empty sentinel.
    ///
    /// # Safety
    ///
    /// No live values may remain in the allocation.
    unsafe fn deallocate(&mut self) {
        debug_assert!(self.cap_slots != 0);
        let layout = self
            .layout
            .alloc_layout(self.physical_bins)
            .expect("layout was validated at allocation");
        // SAFETY: allocation was produced with this exact layout.
        unsafe {
            alloc::alloc::dealloc(self.bins.as_ptr(), layout);
        }
        self.layout = BinLayout::new::<V>(BIN_SLOTS);
        self.bins = empty_bins();
        self.logical_bins = 0;
        self.physical_bins = 1;
        self.cap_slots = 0;
        self.growth_left = 0;
    }

    /// Retains only the values for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&mut V) -> bool) {
        if self.size == 0 {
            return;
        }
        for bin in 0..self.physical_bins {
            // SAFETY: the mask is a snapshot of this bin's full lanes; we
            // only clear lanes named in it, so it stays accurate while the
            // bin is processed.
            unsafe {
                let full = self.group(bin).mask_full(self.layout.slots_per_bin);
                for lane in full {
                    let slot = self.slot_ptr(bin, lane);
                    if !f(&mut *slot) {
                        ptr::drop_in_place(slot);
                        self.set_ctrl(bin, lane, EMPTY);
                        self.size -= 1;
                    }
                }
            }
        }
    }

    /// Returns an iterator over all values, in storage order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            raw: self.raw_iter(),
            remaining: self.size,
            _marker: PhantomData,
        }
    }

    /// Returns an iterator yielding mutable references to all values.
    ///
    /// The parts of the values that determine hash and equality must not be
    /// modified.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            raw: self.raw_iter(),
            remaining: self.size,
            _marker: PhantomData,
        }
    }

    /// Returns a raw cursor over the table that holds no borrow.
    ///
    /// Unlike [`iter`](Self::iter), the table can be mutated while a
    /// `RawIter` exists; it is the caller's responsibility to uphold the
    /// cursor's validity contract. Erasing the element most recently
    /// yielded is permitted (advance first, then erase).
    pub fn raw_iter(&self) -> RawIter<V> {
        RawIter {
            bin: self.bins.as_ptr(),
            lane: 0,
            slots_per_bin: self.layout.slots_per_bin,
            slot_offset: self.layout.slot_offset,
            bin_size: self.layout.bin_size,
            generation: self.generation.snapshot(),
            _marker: PhantomData,
        }
    }

    /// Returns an iterator that removes and yields every value.
    ///
    /// Dropping the iterator removes any values not yet yielded. The
    /// allocation and growth budget are kept.
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            table: self,
            bin: 0,
            lane: 0,
        }
    }
}

#[inline(always)]
fn should_insert_backwards(hash: u64) -> bool {
    // Spare bits away from the top (H1) so the choice varies within a bin.
    (hash >> 21) & 3 == 3
}

/// Writes empty control bytes and zeroed headers into every bin, flagging
/// the last one.
///
/// # Safety
///
/// `bins` must point to a writable allocation of `physical_bins` bins laid
/// out per `layout`.
unsafe fn init_bins(bins: *mut u8, layout: &BinLayout, physical_bins: usize) {
    debug_assert!(physical_bins > 0);
    for bin in 0..physical_bins {
        // SAFETY: caller guarantees the allocation covers every bin.
        unsafe {
            let bin_ptr = bins.add(bin * layout.bin_size);
            ptr::write_bytes(bin_ptr, EMPTY, BIN_SLOTS);
            let last = bin == physical_bins - 1;
            (bin_ptr.add(HEADER_OFFSET) as *mut u16)
                .write(if last { LAST_BIN_FLAG } else { 0 });
        }
    }
}

/// A view into a single entry in the table, which is either vacant or
/// occupied.
///
/// Constructed by [`HashTable::entry`].
pub enum Entry<'a, V> {
    /// No matching value is present; holds the slot an insertion will use.
    Vacant(VacantEntry<'a, V>),
    /// A matching value is present.
    Occupied(OccupiedEntry<'a, V>),
}

impl<'a, V> Entry<'a, V> {
    /// Inserts `default` if the entry is vacant; returns a mutable
    /// reference to the value either way.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant; returns a
    /// mutable reference to the value either way.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `V::default()` if the entry is vacant; returns a mutable
    /// reference to the value either way.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry. The target slot was located when the entry
/// was created; inserting cannot fail or reallocate.
pub struct VacantEntry<'a, V> {
    table: &'a mut HashTable<V>,
    hash: u64,
    bin: usize,
    lane: usize,
    probe_length: usize,
}

impl<'a, V> VacantEntry<'a, V> {
    /// Inserts `value` and returns a mutable reference to it.
    ///
    /// The new element is marked disordered; it joins the hash-order layout
    /// at the next rehash.
    pub fn insert(self, value: V) -> &'a mut V {
        let VacantEntry {
            table,
            hash,
            bin,
            lane,
            probe_length,
        } = self;
        // SAFETY: constructed by `entry` over an empty, in-range lane of an
        // allocated table. The slot is written before the control byte and
        // counters, so nothing is published until the value exists.
        unsafe {
            let slot = table.slot_ptr(bin, lane);
            slot.write(value);
            table.set_ctrl(bin, lane, disordered_ctrl(h2(hash)));
            let origin = h1(hash, table.logical_bins);
            table.widen_search_distance(origin, probe_length + 1);
            table.size += 1;
            table.growth_left -= 1;
            table.generation.bump();
            table.note(|t| t.record_insert(hash, probe_length));
            &mut *slot
        }
    }
}

// An `OccupiedEntry` is only constructed from a `probe_find` hit, so its
// (bin, lane) pair is in range and the slot holds an initialized value for
// as long as the entry borrows the table.
/// A view into an occupied entry.
pub struct OccupiedEntry<'a, V> {
    table: &'a mut HashTable<V>,
    bin: usize,
    lane: usize,
}

impl<'a, V> OccupiedEntry<'a, V> {
    /// Gets a reference to the value.
    pub fn get(&self) -> &V {
        // SAFETY: see the invariant note above.
        unsafe { &*self.table.slot_ptr(self.bin, self.lane) }
    }

    /// Gets a mutable reference to the value.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: see the invariant note above.
        unsafe { &mut *self.table.slot_ptr(self.bin, self.lane) }
    }

    /// Converts the entry into a mutable reference with the table's
    /// lifetime.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: see the invariant note above.
        unsafe { &mut *self.table.slot_ptr(self.bin, self.lane) }
    }

    /// Removes the entry and returns the value.
    ///
    /// Like [`HashTable::remove`], this clears only the control byte; it is
    /// also the extraction primitive the wrappers build `take`-style APIs
    /// on.
    pub fn remove(self) -> V {
        // SAFETY: see the invariant note above; the value is read out
        // exactly once and the lane marked empty.
        unsafe {
            let value = self.table.slot_ptr(self.bin, self.lane).read();
            self.table.set_ctrl(self.bin, self.lane, EMPTY);
            self.table.size -= 1;
            value
        }
    }
}

/// A raw cursor over a table's bins: the current bin, the slot index within
/// it, and (when generation checking is enabled) a snapshot of the table's
/// generation counter.
///
/// The end position is `slot == slots_per_bin` on the bin flagged last. A
/// default-constructed cursor is recognizable by its sentinel slot index
/// and never equals a live one.
pub struct RawIter<V> {
    bin: *const u8,
    lane: usize,
    slots_per_bin: usize,
    slot_offset: usize,
    bin_size: usize,
    generation: IterGeneration,
    _marker: PhantomData<*const V>,
}

impl<V> Clone for RawIter<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for RawIter<V> {}

impl<V> Default for RawIter<V> {
    fn default() -> Self {
        RawIter {
            bin: ptr::null(),
            lane: usize::MAX,
            slots_per_bin: BIN_SLOTS,
            slot_offset: 0,
            bin_size: 0,
            generation: IterGeneration::dangling(),
            _marker: PhantomData,
        }
    }
}

impl<V> PartialEq for RawIter<V> {
    fn eq(&self, other: &Self) -> bool {
        debug_assert!(
            self.is_default() == other.is_default(),
            "comparing a default-constructed iterator with a live iterator"
        );
        self.bin == other.bin && self.lane == other.lane
    }
}

impl<V> Eq for RawIter<V> {}

impl<V> RawIter<V> {
    fn is_default(&self) -> bool {
        self.lane == usize::MAX
    }

    #[inline(always)]
    fn is_last_bin(bin: *const u8) -> bool {
        // SAFETY: callers only pass a live bin pointer.
        unsafe { (bin.add(HEADER_OFFSET) as *const u16).read() & LAST_BIN_FLAG != 0 }
    }

    /// Advances to the next occupied slot and returns a pointer to its
    /// value, or `None` at the end of the table.
    ///
    /// # Safety
    ///
    /// The table this cursor was created from must still be alive, and no
    /// insert, resize, or clear may have happened since (erasing already
    /// yielded elements is fine). With the `generations` feature enabled a
    /// violation traps instead of reading freed memory, as long as the
    /// table itself is still alive.
    pub unsafe fn next(&mut self) -> Option<NonNull<V>> {
        debug_assert!(!self.is_default(), "next() on a default-constructed iterator");
        // SAFETY: the table is alive per this function's contract.
        unsafe {
            self.generation.check("next()");
            loop {
                if self.lane >= self.slots_per_bin {
                    if Self::is_last_bin(self.bin) {
                        self.lane = self.slots_per_bin;
                        return None;
                    }
                    self.bin = self.bin.add(self.bin_size);
                    self.lane = 0;
                }
                let group = Group::load(self.bin);
                let full = if self.lane == 0 {
                    let lead = group.count_leading_empty(self.slots_per_bin);
                    group.mask_full(self.slots_per_bin).clear_below(lead)
                } else {
                    group.mask_full(self.slots_per_bin).clear_below(self.lane)
                };
                if let Some(lane) = full.first() {
                    self.lane = lane + 1;
                    let slot =
                        self.bin.add(self.slot_offset + lane * mem::size_of::<V>()) as *mut V;
                    return Some(NonNull::new_unchecked(slot));
                }
                self.lane = self.slots_per_bin;
            }
        }
    }
}

/// An iterator over the values of a [`HashTable`].
pub struct Iter<'a, V> {
    raw: RawIter<V>,
    remaining: usize,
    _marker: PhantomData<&'a HashTable<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // SAFETY: the borrow in `_marker` keeps the table alive and
        // unmutated for 'a.
        unsafe { self.raw.next().map(|p| &*p.as_ptr()) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

/// An iterator over mutable references to the values of a [`HashTable`].
pub struct IterMut<'a, V> {
    raw: RawIter<V>,
    remaining: usize,
    _marker: PhantomData<&'a mut HashTable<V>>,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<&'a mut V> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // SAFETY: the exclusive borrow in `_marker` keeps the table alive
        // and otherwise untouched for 'a, and each slot is yielded once.
        unsafe { self.raw.next().map(|p| &mut *p.as_ptr()) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}

/// A draining iterator for [`HashTable`]; see [`HashTable::drain`].
pub struct Drain<'a, V> {
    table: &'a mut HashTable<V>,
    bin: usize,
    lane: usize,
}

impl<V> Iterator for Drain<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        if self.table.cap_slots == 0 {
            return None;
        }
        loop {
            if self.lane >= self.table.layout.slots_per_bin {
                if self.bin + 1 == self.table.physical_bins {
                    return None;
                }
                self.bin += 1;
                self.lane = 0;
            }
            // SAFETY: indices stay in range; each full slot is read out
            // exactly once and marked empty before being returned.
            unsafe {
                let full = self
                    .table
                    .group(self.bin)
                    .mask_full(self.table.layout.slots_per_bin)
                    .clear_below(self.lane);
                if let Some(lane) = full.first() {
                    self.lane = lane + 1;
                    let value = self.table.slot_ptr(self.bin, lane).read();
                    self.table.set_ctrl(self.bin, lane, EMPTY);
                    self.table.size -= 1;
                    return Some(value);
                }
            }
            self.lane = self.table.layout.slots_per_bin;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.size, Some(self.table.size))
    }
}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

/// An owning iterator for [`HashTable`].
pub struct IntoIter<V> {
    table: HashTable<V>,
    bin: usize,
    lane: usize,
}

impl<V> Iterator for IntoIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        if self.table.cap_slots == 0 {
            return None;
        }
        loop {
            if self.lane >= self.table.layout.slots_per_bin {
                if self.bin + 1 == self.table.physical_bins {
                    return None;
                }
                self.bin += 1;
                self.lane = 0;
            }
            // SAFETY: as in `Drain::next`; values not yielded before the
            // iterator drops are released by the table's own drop.
            unsafe {
                let full = self
                    .table
                    .group(self.bin)
                    .mask_full(self.table.layout.slots_per_bin)
                    .clear_below(self.lane);
                if let Some(lane) = full.first() {
                    self.lane = lane + 1;
                    let value = self.table.slot_ptr(self.bin, lane).read();
                    self.table.set_ctrl(self.bin, lane, EMPTY);
                    self.table.size -= 1;
                    return Some(value);
                }
            }
            self.lane = self.table.layout.slots_per_bin;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.size, Some(self.table.size))
    }
}

impl<V> IntoIterator for HashTable<V> {
    type Item = V;
    type IntoIter = IntoIter<V>;

    fn into_iter(self) -> IntoIter<V> {
        IntoIter {
            table: self,
            bin: 0,
            lane: 0,
        }
    }
}

impl<'a, V> IntoIterator for &'a HashTable<V> {
    type Item = &'a V;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Iter<'a, V> {
        self.iter()
    }
}

/// Debug statistics for table analysis.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of elements currently in the table.
    pub populated: usize,
    /// Total allocated slots.
    pub capacity: usize,
    /// Bins addressable by H1.
    pub logical_bins: usize,
    /// Bins actually allocated, including the overflow tail.
    pub physical_bins: usize,
    /// Elements inserted since the last rehash (disordered flag set).
    pub disordered: usize,
    /// Insertions left before a rehash is forced.
    pub growth_left: usize,
    /// populated / capacity.
    pub load_factor: f64,
    /// Bytes in the backing allocation.
    pub total_bytes: usize,
}

#[cfg(feature = "stats")]
impl DebugStats {
    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} slots ({:.2}% load factor)",
            self.populated,
            self.capacity,
            self.load_factor * 100.0
        );
        println!(
            "Bins: {} logical + {} tail",
            self.logical_bins,
            self.physical_bins - self.logical_bins
        );
        println!(
            "Disordered: {} entries ({} insertions until rehash)",
            self.disordered, self.growth_left
        );
        println!("Total allocated: {} bytes", self.total_bytes);
    }
}

/// Histograms of probe distances and search distances.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct ProbeHistogram {
    /// Number of elements sampled.
    pub populated: usize,
    /// Per-element distance from the preferred bin to the storage bin,
    /// saturating into the final bucket.
    pub probe_length: [usize; 16],
    /// Distribution of per-bin search distances, saturating into the final
    /// bucket.
    pub search_distance: [usize; 16],
    /// Largest search distance of any bin.
    pub max_search_distance: usize,
}

#[cfg(feature = "stats")]
impl ProbeHistogram {
    /// Pretty-print the histograms.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self
            .probe_length
            .iter()
            .chain(self.search_distance.iter())
            .copied()
            .max()
            .unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }
        let bar = |count: usize| "#".repeat(count * 50 / max);
        println!("probe length by element ({} entries):", self.populated);
        for (i, &count) in self.probe_length.iter().enumerate() {
            println!("{i:>2} | {} ({count})", bar(count));
        }
        println!("search distance by bin:");
        for (i, &count) in self.search_distance.iter().enumerate() {
            println!("{i:>2} | {} ({count})", bar(count));
        }
        println!("max search distance: {}", self.max_search_distance);
    }
}

#[cfg(feature = "stats")]
impl<V> HashTable<V> {
    /// Returns utilization statistics for debugging.
    pub fn debug_stats(&self) -> DebugStats {
        let mut disordered = 0;
        if self.cap_slots != 0 {
            for bin in 0..self.physical_bins {
                // SAFETY: bin indices are in range.
                unsafe {
                    let full = self.group(bin).mask_full(self.layout.slots_per_bin);
                    for lane in full {
                        if is_disordered_ctrl(self.ctrl(bin, lane)) {
                            disordered += 1;
                        }
                    }
                }
            }
        }
        DebugStats {
            populated: self.size,
            capacity: self.cap_slots,
            logical_bins: self.logical_bins,
            physical_bins: self.physical_bins,
            disordered,
            growth_left: self.growth_left,
            load_factor: if self.cap_slots == 0 {
                0.0
            } else {
                self.size as f64 / self.cap_slots as f64
            },
            total_bytes: if self.cap_slots == 0 {
                0
            } else {
                self.physical_bins * self.layout.bin_size
            },
        }
    }

    /// Computes probe-distance and search-distance histograms. `hash` must
    /// recompute each stored value's hash.
    pub fn probe_histogram(&self, hash: impl Fn(&V) -> u64) -> ProbeHistogram {
        let mut histogram = ProbeHistogram {
            populated: self.size,
            probe_length: [0; 16],
            search_distance: [0; 16],
            max_search_distance: 0,
        };
        if self.cap_slots == 0 {
            return histogram;
        }
        for bin in 0..self.physical_bins {
            // SAFETY: bin indices are in range; full lanes are initialized.
            unsafe {
                let sd = self.search_distance(bin);
                histogram.search_distance[sd.min(15)] += 1;
                histogram.max_search_distance = histogram.max_search_distance.max(sd);
                let full = self.group(bin).mask_full(self.layout.slots_per_bin);
                for lane in full {
                    let origin = h1(hash(&*self.slot_ptr(bin, lane)), self.logical_bins);
                    let distance = if bin >= origin {
                        bin - origin
                    } else {
                        bin + self.physical_bins - origin
                    };
                    histogram.probe_length[distance.min(15)] += 1;
                }
            }
        }
        histogram
    }
}
