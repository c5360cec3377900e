use serde::Serialize;

pub const MIN_QUALITY: u8 = 50;
pub const MAX_QUALITY: u8 = 95;
pub const MAX_ITERATIONS: u32 = 10;
/// A trial at most this factor above the target is accepted.
pub const SIZE_TOLERANCE: f64 = 1.05;

/// Anything a trial encode produces that has a byte size.
pub trait Measured {
    fn measured_len(&self) -> u64;
}

impl Measured for u64 {
    fn measured_len(&self) -> u64 {
        *self
    }
}

impl Measured for Vec<u8> {
    fn measured_len(&self) -> u64 {
        self.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchPolicy {
    pub min_quality: u8,
    pub max_quality: u8,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            min_quality: MIN_QUALITY,
            max_quality: MAX_QUALITY,
            max_iterations: MAX_ITERATIONS,
            tolerance: SIZE_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPhase {
    Searching,
    /// A trial landed inside the tolerance band.
    Converged,
    /// Iteration cap reached or the interval stopped shrinking.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    pub iteration: u32,
    pub quality: u8,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct SearchState {
    policy: SearchPolicy,
    target: u64,
    lower: u8,
    upper: u8,
    candidate: u8,
    best: Option<Trial>,
    iterations: u32,
    phase: SearchPhase,
}

impl SearchState {
    /// `initial` is clamped into the policy's quality bounds.
    pub fn new(policy: SearchPolicy, target: u64, initial: u8) -> Self {
        let lower = policy.min_quality.min(policy.max_quality);
        let upper = policy.max_quality.max(policy.min_quality);
        let phase = if policy.max_iterations == 0 {
            SearchPhase::Exhausted
        } else {
            SearchPhase::Searching
        };
        SearchState {
            policy,
            target,
            lower,
            upper,
            candidate: initial.clamp(lower, upper),
            best: None,
            iterations: 0,
            phase,
        }
    }

    /// Quality to measure next, or `None` once the search is over.
    pub fn candidate(&self) -> Option<u8> {
        match self.phase {
            SearchPhase::Searching => Some(self.candidate),
            _ => None,
        }
    }

    pub fn bounds(&self) -> (u8, u8) {
        (self.lower, self.upper)
    }

    pub fn best(&self) -> Option<Trial> {
        self.best
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    fn distance(&self, size: u64) -> u64 {
        size.abs_diff(self.target)
    }

    /// Feeds back the size produced by the current candidate.
    pub fn step(&mut self, measured: u64) -> SearchPhase {
        if self.phase != SearchPhase::Searching {
            return self.phase;
        }

        self.iterations += 1;
        let trial = Trial {
            iteration: self.iterations,
            quality: self.candidate,
            size: measured,
        };
        // Strict comparison keeps the earliest trial on ties.
        if self
            .best
            .map_or(true, |b| self.distance(measured) < self.distance(b.size))
        {
            self.best = Some(trial);
        }

        if measured as f64 <= self.target as f64 * self.policy.tolerance {
            self.phase = SearchPhase::Converged;
            return self.phase;
        }

        let current = self.candidate;
        let next = if measured > self.target {
            self.upper = current;
            self.lower + (current - self.lower) / 2
        } else {
            self.lower = current;
            current + (self.upper - current) / 2
        };

        if self.iterations >= self.policy.max_iterations || next == current {
            self.phase = SearchPhase::Exhausted;
        } else {
            self.candidate = next;
        }
        self.phase
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome<T> {
    pub quality: u8,
    pub size: u64,
    pub iterations: u32,
    pub phase: SearchPhase,
    /// Encoder output of the chosen trial.
    pub payload: T,
}

/// Runs the search with `encode` as the trial function. The returned trial is the
/// one closest to `target` among everything measured, earliest first on ties.
pub fn search<T, E, F>(
    policy: &SearchPolicy,
    target: u64,
    initial: u8,
    mut encode: F,
) -> Result<SearchOutcome<T>, E>
where
    T: Measured,
    F: FnMut(u8) -> Result<T, E>,
{
    let mut state = SearchState::new(*policy, target, initial);
    let mut best_payload: Option<T> = None;

    // A zero-iteration policy still needs one measurement to have an answer.
    if state.candidate().is_none() {
        let quality = initial.clamp(state.lower, state.upper);
        let payload = encode(quality)?;
        return Ok(SearchOutcome {
            quality,
            size: payload.measured_len(),
            iterations: 1,
            phase: SearchPhase::Exhausted,
            payload,
        });
    }

    while let Some(quality) = state.candidate() {
        let payload = encode(quality)?;
        let size = payload.measured_len();
        state.step(size);
        tracing::trace!(quality, size, target_bytes = target, iteration = state.iterations(), "trial encode");
        if state.best().is_some_and(|b| b.iteration == state.iterations()) {
            best_payload = Some(payload);
        }
    }

    match (state.best(), best_payload) {
        (Some(best), Some(payload)) => Ok(SearchOutcome {
            quality: best.quality,
            size: best.size,
            iterations: state.iterations(),
            phase: state.phase(),
            payload,
        }),
        _ => unreachable!("a searching state always measures at least once"),
    }
}
