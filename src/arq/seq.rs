//! 序号空间（模 W 的环形算术）

/// 序号空间 `[0, modulus)`。所有比较都基于环形距离。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    modulus: u64,
}

impl SeqSpace {
    pub fn new(modulus: u64) -> Self {
        assert!(modulus > 0, "sequence space must not be empty");
        Self { modulus }
    }

    pub fn modulus(self) -> u64 {
        self.modulus
    }

    pub fn half(self) -> u64 {
        self.modulus / 2
    }

    pub fn contains(self, a: u64) -> bool {
        a < self.modulus
    }

    pub fn next(self, a: u64) -> u64 {
        (a + 1) % self.modulus
    }

    pub fn prev(self, a: u64) -> u64 {
        (a + self.modulus - 1) % self.modulus
    }

    pub fn add(self, a: u64, n: u64) -> u64 {
        (a + n % self.modulus) % self.modulus
    }

    /// `to` 在 `from` 之前多少步：`(to - from + W) % W`。
    pub fn distance(self, from: u64, to: u64) -> u64 {
        (to % self.modulus + self.modulus - from % self.modulus) % self.modulus
    }

    /// `a` 严格领先 `base`，且不超过半个序号空间。
    pub fn is_ahead(self, base: u64, a: u64) -> bool {
        let d = self.distance(base, a);
        d != 0 && d < self.half()
    }

    /// `base` 开始的 `len` 个序号。
    pub fn window(self, base: u64, len: u64) -> impl Iterator<Item = u64> {
        (0..len).map(move |i| self.add(base, i))
    }
}
