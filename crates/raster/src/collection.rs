use std::collections::BTreeMap;

use crate::{AnyImage, Error, Result};

/// Keyed store for multi-resolution time series: `(tag, date)` maps to an
/// image. The collection owns its images; consumers borrow them read-only.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    images: BTreeMap<String, BTreeMap<i32, AnyImage>>,
}

impl ImageCollection {
    pub fn new() -> Self {
        ImageCollection::default()
    }

    /// Inserts or replaces the image stored for `(tag, date)`.
    pub fn set(&mut self, tag: &str, date: i32, image: AnyImage) {
        self.images.entry(tag.to_string()).or_default().insert(date, image);
    }

    pub fn get(&self, tag: &str, date: i32) -> Result<&AnyImage> {
        self.images
            .get(tag)
            .and_then(|dates| dates.get(&date))
            .ok_or_else(|| Error::not_found(tag, date))
    }

    pub fn has(&self, tag: &str, date: i32) -> bool {
        self.images.get(tag).is_some_and(|dates| dates.contains_key(&date))
    }

    pub fn remove(&mut self, tag: &str, date: i32) -> Option<AnyImage> {
        let dates = self.images.get_mut(tag)?;
        let removed = dates.remove(&date);
        if dates.is_empty() {
            self.images.remove(tag);
        }
        removed
    }

    /// The sorted dates present for a tag.
    pub fn dates(&self, tag: &str) -> Vec<i32> {
        self.images.get(tag).map(|dates| dates.keys().copied().collect()).unwrap_or_default()
    }

    /// All dates present for any tag, sorted.
    pub fn all_dates(&self) -> Vec<i32> {
        let mut dates: Vec<i32> = self.images.values().flat_map(|d| d.keys().copied()).collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    /// Any stored image, used to probe properties common to the collection.
    pub fn get_any(&self) -> Option<&AnyImage> {
        self.images.values().next().and_then(|dates| dates.values().next())
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DenseImage;

    fn probe(value: u8) -> AnyImage {
        AnyImage::U8(DenseImage::filled_with(value, 1, 1, 1).unwrap())
    }

    #[test]
    fn set_get_replace() {
        let mut col = ImageCollection::new();
        col.set("high", 20200101, probe(1));
        col.set("high", 20200101, probe(2));
        assert_eq!(col.get("high", 20200101).unwrap().at_f64(0, 0, 0), 2.0);
    }

    #[test]
    fn missing_lookup_is_not_found() {
        let col = ImageCollection::new();
        let err = col.get("high", 1).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn dates_are_sorted() {
        let mut col = ImageCollection::new();
        col.set("low", 3, probe(0));
        col.set("low", 1, probe(0));
        col.set("low", 2, probe(0));
        assert_eq!(col.dates("low"), vec![1, 2, 3]);
        assert!(col.dates("high").is_empty());
    }

    #[test]
    fn remove_cleans_up() {
        let mut col = ImageCollection::new();
        col.set("low", 1, probe(0));
        assert!(col.remove("low", 1).is_some());
        assert!(col.remove("low", 1).is_none());
        assert!(col.is_empty());
        assert!(col.get_any().is_none());
    }
}
