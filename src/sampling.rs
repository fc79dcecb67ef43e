use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;

/// Decides how many members each basin contributes and which ones.
pub trait TemplateSampler {
    /// Per-basin quotas for a target count, given basin sizes.
    fn allocate(&mut self, sizes: &[usize], target: usize) -> Vec<usize>;

    /// `quota` distinct member positions drawn from a basin of `size` members.
    fn draw(&mut self, size: usize, quota: usize) -> Vec<usize>;
}

/// Proportional quotas with random rebalancing; random draws without
/// replacement.
///
/// The quota sum always equals `min(target, Σ sizes)` and no quota exceeds
/// its basin's size.
pub struct ProportionalSampler {
    rng: StdRng,

    // Sampling statistics
    pub sampled_count: usize,
    pub basins_seen: usize,
}

impl ProportionalSampler {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => {
                info!("Proportional sampler seeded with {}", s);
                StdRng::seed_from_u64(s)
            }
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            sampled_count: 0,
            basins_seen: 0,
        }
    }

    /// Basins picked at random from `eligible`, at most `count` of them.
    fn pick(&mut self, mut eligible: Vec<usize>, count: usize) -> Vec<usize> {
        eligible.shuffle(&mut self.rng);
        eligible.truncate(count);
        eligible
    }

    /// Nudge quotas one unit at a time until they sum to `goal`, never going
    /// above a basin's size or below zero.
    fn settle(&mut self, quotas: &mut [usize], sizes: &[usize], goal: usize) {
        loop {
            let sum: usize = quotas.iter().sum();
            if sum == goal {
                break;
            }
            if sum < goal {
                let open: Vec<usize> = (0..quotas.len()).filter(|&j| quotas[j] < sizes[j]).collect();
                for j in self.pick(open, goal - sum) {
                    quotas[j] += 1;
                }
            } else {
                let surplus = sum - goal;
                let mut open: Vec<usize> = (0..quotas.len()).filter(|&j| quotas[j] > 1).collect();
                if open.is_empty() {
                    open = (0..quotas.len()).filter(|&j| quotas[j] > 0).collect();
                }
                for j in self.pick(open, surplus) {
                    quotas[j] -= 1;
                }
            }
        }
    }
}

impl TemplateSampler for ProportionalSampler {
    fn allocate(&mut self, sizes: &[usize], target: usize) -> Vec<usize> {
        let k = sizes.len();
        let total: usize = sizes.iter().sum();
        if k == 0 || total == 0 {
            return vec![0; k];
        }
        self.basins_seen += k;

        let mut quotas: Vec<usize> = sizes
            .iter()
            .map(|&s| {
                let q = (target as f64 * s as f64 / total as f64).round_ties_even() as usize;
                q.max(1)
            })
            .collect();

        let sum: usize = quotas.iter().sum();
        if sum < target {
            for j in self.pick((0..k).collect(), target - sum) {
                quotas[j] += 1;
            }
        } else if sum > target {
            let surplus = sum - target;
            let mut eligible: Vec<usize> = (0..k).filter(|&j| quotas[j] > 1).collect();
            if eligible.len() < surplus {
                eligible = (0..k).collect();
            }
            for j in self.pick(eligible, surplus) {
                quotas[j] -= 1;
            }
        }
        for (q, &s) in quotas.iter_mut().zip(sizes) {
            *q = (*q).min(s);
        }

        let goal = target.min(total);
        self.settle(&mut quotas, sizes, goal);
        debug!(
            "Allocated {} samples over {} basins (target {}, available {})",
            goal, k, target, total
        );
        trace!("Quotas: {:?}", quotas);
        quotas
    }

    fn draw(&mut self, size: usize, quota: usize) -> Vec<usize> {
        let quota = quota.min(size);
        self.sampled_count += quota;
        index::sample(&mut self.rng, size, quota).into_vec()
    }
}
