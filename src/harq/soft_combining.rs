//! 软合并缓存：按冗余版本分组保存收到的各次传输。

use super::HarqError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftCombiningBuffer<T> {
    rvs: Vec<Vec<T>>,
}

impl<T> SoftCombiningBuffer<T> {
    pub fn new(num_rvs: usize) -> Self {
        Self {
            rvs: (0..num_rvs).map(|_| Vec::new()).collect(),
        }
    }

    pub fn num_rvs(&self) -> usize {
        self.rvs.len()
    }

    pub fn append(&mut self, rv: usize, entry: T) -> Result<(), HarqError> {
        let num_rvs = self.num_rvs();
        self.rvs
            .get_mut(rv)
            .ok_or(HarqError::InvalidRv { rv, num_rvs })?
            .push(entry);
        Ok(())
    }

    pub fn entries(&self, rv: usize) -> Result<&[T], HarqError> {
        self.rvs
            .get(rv)
            .map(Vec::as_slice)
            .ok_or(HarqError::InvalidRv {
                rv,
                num_rvs: self.num_rvs(),
            })
    }

    pub fn clear(&mut self) {
        self.rvs.iter_mut().for_each(Vec::clear);
    }

    pub fn total_entries(&self) -> usize {
        self.rvs.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rvs.iter().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rvs.iter().flatten()
    }
}
