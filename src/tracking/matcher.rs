use std::collections::HashSet;

use bitarray::BitArray;
use space::Metric;

use crate::{
    algorithms::brief::Descriptor,
    config::MatcherConfig,
    tracking::features::{FeatureSet, OrbFeature},
};

/// A live feature paired with its nearest reference feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correspondence {
    pub reference: usize,
    pub live: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// Pairs live features with reference features.
///
/// The returned sequence is lazy and finite; it can be consumed once.
pub trait DescriptorMatcher {
    type Matches<'a>: Iterator<Item = Correspondence>
    where
        Self: 'a;

    fn match_features<'a>(&'a self, live: &'a FeatureSet, reference: &'a FeatureSet) -> Self::Matches<'a>;
}

// Implementations for `space`

#[derive(Debug, Clone, Copy, Default)]
pub struct Hamming;

impl Metric<Descriptor> for Hamming {
    type Unit = u32;
    fn distance(&self, a: &Descriptor, b: &Descriptor) -> Self::Unit {
        BitArray::new(*a).distance(&BitArray::new(*b))
    }
}

impl<'f> Metric<&'f OrbFeature> for Hamming {
    type Unit = u32;
    fn distance(&self, a: &&OrbFeature, b: &&OrbFeature) -> Self::Unit {
        Metric::<Descriptor>::distance(self, &a.descriptor, &b.descriptor)
    }
}

/// Exhaustive nearest neighbour search with Lowe's ratio test.
#[derive(Debug, Clone, Default)]
pub struct BruteForceMatcher {
    config: MatcherConfig,
}

impl BruteForceMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }
}

impl DescriptorMatcher for BruteForceMatcher {
    type Matches<'a> = Matches<'a>;

    fn match_features<'a>(&'a self, live: &'a FeatureSet, reference: &'a FeatureSet) -> Matches<'a> {
        Matches {
            config: &self.config,
            live,
            reference,
            next_live: 0,
            claimed: HashSet::new(),
        }
    }
}

/// Lazily matches one live feature at a time, in live order.
pub struct Matches<'a> {
    config: &'a MatcherConfig,
    live: &'a FeatureSet,
    reference: &'a FeatureSet,
    next_live: usize,
    claimed: HashSet<usize>,
}

impl<'a> Matches<'a> {
    /// Best and second best reference distances. Ties keep the lowest index.
    fn nearest_two(&self, feature: &OrbFeature) -> Option<(usize, u32, Option<u32>)> {
        let mut best: Option<(usize, u32)> = None;
        let mut second: Option<u32> = None;

        for (index, candidate) in self.reference.iter().enumerate() {
            let distance = Hamming.distance(&feature, &candidate);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {
                    if second.map_or(true, |s| distance < s) {
                        second = Some(distance);
                    }
                }
                _ => {
                    second = best.map(|(_, d)| d);
                    best = Some((index, distance));
                }
            }
        }

        best.map(|(index, distance)| (index, distance, second))
    }

    fn accept(&self, best: u32, second: Option<u32>) -> bool {
        if best > self.config.max_distance {
            return false;
        }
        match second {
            // filter out answers potentially chosen by noise with Lowe's ratio test
            // https://stackoverflow.com/questions/51197091/how-does-the-lowes-ratio-test-work
            Some(second) => (best as f32) < self.config.ratio * second as f32,
            None => true,
        }
    }
}

impl<'a> Iterator for Matches<'a> {
    type Item = Correspondence;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_live < self.live.len() {
            let live = self.next_live;
            self.next_live += 1;

            let Some((reference, distance, second)) = self.nearest_two(&self.live.features[live]) else {
                return None;
            };
            if !self.accept(distance, second) {
                continue;
            }
            // check that this reference point has not already been assigned a correspondence
            if self.config.unique && !self.claimed.insert(reference) {
                continue;
            }

            return Some(Correspondence {
                reference,
                live,
                distance,
            });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.live.len() - self.next_live))
    }
}
