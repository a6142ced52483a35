//! Bitmap data structure helper, used for per-child liveness and presence.

use std::fmt;

use crate::utils::HaError;

use fixedbitset::FixedBitSet;

/// Compact bitmap for u8 child index -> bool mapping.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap(FixedBitSet);

impl Bitmap {
    /// Creates a new bitmap of given size. If `ones` is true, all slots are
    /// marked true initially; otherwise, all slots are initially false.
    pub fn new(size: u8, ones: bool) -> Self {
        if size == 0 {
            panic!("invalid bitmap size {}", size);
        }
        let mut bitset = FixedBitSet::with_capacity(size as usize);

        if ones {
            bitset.set_range(.., true);
        }

        Bitmap(bitset)
    }

    /// Creates a new bitmap of given size from vec literal. Indices in the
    /// vec are bits to be set as true.
    pub fn from(size: u8, ones: Vec<u8>) -> Self {
        let mut bitmap = Self::new(size, false);

        for idx in ones {
            if let Err(e) = bitmap.set(idx, true) {
                panic!("{}", e);
            }
        }

        bitmap
    }

    /// Sets bit at index to given flag.
    #[inline]
    pub fn set(&mut self, idx: u8, flag: bool) -> Result<(), HaError> {
        if idx as usize >= self.0.len() {
            return Err(HaError(format!("index {} out of bound", idx)));
        }
        self.0.set(idx as usize, flag);
        Ok(())
    }

    /// Gets the bit flag at index.
    #[inline]
    pub fn get(&self, idx: u8) -> Result<bool, HaError> {
        if idx as usize >= self.0.len() {
            return Err(HaError(format!("index {} out of bound", idx)));
        }
        Ok(self.0[idx as usize])
    }

    /// Bit flag at index, treating out-of-bound indices as false.
    #[inline]
    pub fn is_set(&self, idx: u8) -> bool {
        (idx as usize) < self.0.len() && self.0[idx as usize]
    }

    /// Returns the size of the bitmap.
    #[inline]
    pub fn size(&self) -> u8 {
        self.0.len() as u8
    }

    /// Returns the number of trues in the bitmap.
    #[inline]
    pub fn count(&self) -> u8 {
        self.0.count_ones(..) as u8
    }

    /// True if no bit is set.
    #[inline]
    pub fn is_clear(&self) -> bool {
        self.count() == 0
    }

    /// Index of the lowest set bit, if any.
    #[inline]
    pub fn first_set(&self) -> Option<u8> {
        self.0.ones().next().map(|i| i as u8)
    }

    /// Index of the next set bit strictly after `idx`, wrapping around to
    /// the front. May return `idx` itself if it is the only set bit.
    pub fn next_set_wrapping(&self, idx: u8) -> Option<u8> {
        let size = self.size();
        (1..=size)
            .map(|step| ((idx as u16 + step as u16) % size as u16) as u8)
            .find(|&i| self.is_set(i))
    }

    /// Set bits in wrapped order starting at `start` (inclusive).
    pub fn ones_from(&self, start: u8) -> Vec<u8> {
        let size = self.size();
        (0..size)
            .map(|step| ((start as u16 + step as u16) % size as u16) as u8)
            .filter(|&i| self.is_set(i))
            .collect()
    }

    /// Intersection of two bitmaps of the same size.
    pub fn and(&self, other: &Bitmap) -> Bitmap {
        let mut bitset = self.0.clone();
        bitset.intersect_with(&other.0);
        Bitmap(bitset)
    }

    /// Allows `for (id, bit) in map.iter()`.
    #[inline]
    pub fn iter(&self) -> BitmapIter {
        BitmapIter { map: self, idx: 0 }
    }
}

/// Iterator over `Bitmap`, yielding `(id, bit)` pairs.
#[derive(Debug, Clone)]
pub struct BitmapIter<'m> {
    map: &'m Bitmap,
    idx: usize,
}

impl Iterator for BitmapIter<'_> {
    type Item = (u8, bool);

    fn next(&mut self) -> Option<Self::Item> {
        let id: u8 = self.idx as u8;
        if self.idx < self.map.size() as usize {
            self.idx += 1;
            Some((id, self.map.is_set(id)))
        } else {
            None
        }
    }
}

// Implement `Debug` trait manually for better trace printing.
impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{}; [", self.size())?;
        let mut first_idx = true;
        for i in self
            .iter()
            .filter_map(|(i, flag)| if flag { Some(i) } else { None })
        {
            if !first_idx {
                write!(f, ", {}", i)?;
            } else {
                write!(f, "{}", i)?;
                first_idx = false;
            }
        }
        write!(f, "]}}")
    }
}
