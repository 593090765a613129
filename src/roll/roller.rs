use super::die::RolledDie;
use super::error::RollerError;
use crate::common::{DieKind, Int, FUDGE_FACES, MAX_NDICE, MAX_NSIDES, MIN_NSIDES};
use async_trait::async_trait;
use log::debug;
use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

/// Future returned by a [`CallbackRoller`] callback.
pub type BoxRollFuture = Pin<Box<dyn Future<Output = Result<Vec<Int>, RollerError>> + Send>>;

/// Source of raw integer outcomes.
///
/// Implementations may suspend (an external dice server, a queue); every
/// suspension point of an evaluation sits behind this trait. A roller is
/// single-consumer: concurrent evaluations need one roller each.
#[async_trait]
pub trait Roller: Send {
    /// `ndice` outcomes in `[min, min + nsides - 1]`.
    async fn roll(
        &mut self,
        ndice: Int,
        nsides: Int,
        min: Int,
        kind: DieKind,
    ) -> Result<Vec<Int>, RollerError>;

    /// `ndice` outcomes drawn from `vals`.
    async fn roll_vals(
        &mut self,
        ndice: Int,
        vals: &[Int],
        kind: DieKind,
    ) -> Result<Vec<Int>, RollerError>;
}

fn check_ndice(ndice: Int) -> Result<(), RollerError> {
    if (0..=MAX_NDICE).contains(&ndice) {
        Ok(())
    } else {
        Err(RollerError::OutOfRange {
            value: ndice,
            low: 0,
            high: MAX_NDICE,
        })
    }
}

fn check_nsides(nsides: Int) -> Result<(), RollerError> {
    if (MIN_NSIDES..=MAX_NSIDES).contains(&nsides) {
        Ok(())
    } else {
        Err(RollerError::OutOfRange {
            value: nsides,
            low: MIN_NSIDES,
            high: MAX_NSIDES,
        })
    }
}

fn vals_range(vals: &[Int]) -> (Int, Int) {
    let low = vals.iter().copied().min().unwrap_or(0);
    let high = vals.iter().copied().max().unwrap_or(0);
    (low, high)
}

/// Uniform RNG-backed roller; securely seeded by default.
pub struct RngRoller<R: Rng + Send = StdRng> {
    rng: R,
}

impl RngRoller {
    pub fn secure() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for RngRoller {
    fn default() -> Self {
        Self::secure()
    }
}

impl<R: Rng + Send> RngRoller<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

#[async_trait]
impl<R: Rng + Send> Roller for RngRoller<R> {
    async fn roll(
        &mut self,
        ndice: Int,
        nsides: Int,
        min: Int,
        _kind: DieKind,
    ) -> Result<Vec<Int>, RollerError> {
        check_ndice(ndice)?;
        check_nsides(nsides)?;
        let dist = Uniform::new_inclusive(min, min + nsides - 1);
        Ok((0..ndice).map(|_| self.rng.sample(dist)).collect())
    }

    async fn roll_vals(
        &mut self,
        ndice: Int,
        vals: &[Int],
        _kind: DieKind,
    ) -> Result<Vec<Int>, RollerError> {
        check_ndice(ndice)?;
        if vals.is_empty() {
            let (low, high) = vals_range(vals);
            return Err(RollerError::OutOfRange {
                value: 0,
                low,
                high,
            });
        }
        Ok((0..ndice)
            .map(|_| vals[self.rng.gen_range(0..vals.len())])
            .collect())
    }
}

/// Consumes an ordered queue of predetermined outcomes. Each consumed value
/// is checked against the requested interval or value set.
pub struct PreRolledRoller {
    queue: VecDeque<Int>,
}

impl PreRolledRoller {
    pub fn new(values: impl IntoIterator<Item = Int>) -> Self {
        Self {
            queue: values.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    fn pop(&mut self) -> Result<Int, RollerError> {
        self.queue.pop_front().ok_or(RollerError::Exhausted)
    }
}

#[async_trait]
impl Roller for PreRolledRoller {
    async fn roll(
        &mut self,
        ndice: Int,
        nsides: Int,
        min: Int,
        _kind: DieKind,
    ) -> Result<Vec<Int>, RollerError> {
        check_ndice(ndice)?;
        check_nsides(nsides)?;
        let high = min + nsides - 1;
        let mut out = Vec::with_capacity(ndice as usize);
        for _ in 0..ndice {
            let v = self.pop()?;
            if !(min..=high).contains(&v) {
                return Err(RollerError::OutOfRange {
                    value: v,
                    low: min,
                    high,
                });
            }
            out.push(v);
        }
        Ok(out)
    }

    async fn roll_vals(
        &mut self,
        ndice: Int,
        vals: &[Int],
        _kind: DieKind,
    ) -> Result<Vec<Int>, RollerError> {
        check_ndice(ndice)?;
        let mut out = Vec::with_capacity(ndice as usize);
        for _ in 0..ndice {
            let v = self.pop()?;
            if !vals.contains(&v) {
                let (low, high) = vals_range(vals);
                return Err(RollerError::OutOfRange {
                    value: v,
                    low,
                    high,
                });
            }
            out.push(v);
        }
        Ok(out)
    }
}

/// Delegates to user-supplied asynchronous functions returning materialized
/// sequences.
pub struct CallbackRoller {
    roll_fn: Box<dyn FnMut(Int, Int, Int, DieKind) -> BoxRollFuture + Send>,
    vals_fn: Box<dyn FnMut(Int, Vec<Int>, DieKind) -> BoxRollFuture + Send>,
}

impl CallbackRoller {
    pub fn new(
        roll_fn: impl FnMut(Int, Int, Int, DieKind) -> BoxRollFuture + Send + 'static,
        vals_fn: impl FnMut(Int, Vec<Int>, DieKind) -> BoxRollFuture + Send + 'static,
    ) -> Self {
        Self {
            roll_fn: Box::new(roll_fn),
            vals_fn: Box::new(vals_fn),
        }
    }
}

#[async_trait]
impl Roller for CallbackRoller {
    async fn roll(
        &mut self,
        ndice: Int,
        nsides: Int,
        min: Int,
        kind: DieKind,
    ) -> Result<Vec<Int>, RollerError> {
        check_ndice(ndice)?;
        check_nsides(nsides)?;
        (self.roll_fn)(ndice, nsides, min, kind).await
    }

    async fn roll_vals(
        &mut self,
        ndice: Int,
        vals: &[Int],
        kind: DieKind,
    ) -> Result<Vec<Int>, RollerError> {
        check_ndice(ndice)?;
        (self.vals_fn)(ndice, vals.to_vec(), kind).await
    }
}

/// Typed convenience layer over a [`Roller`], producing [`RolledDie`] values
/// and dispatching rerolls by die kind.
pub struct DiceRoller<R: Roller> {
    inner: R,
}

impl<R: Roller> DiceRoller<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub async fn roll(&mut self, ndice: Int, nsides: Int) -> Result<Vec<RolledDie>, RollerError> {
        let values = self
            .inner
            .roll(ndice, nsides, 1, DieKind::Polyhedral)
            .await?;
        debug!("rolled {}d{}: {:?}", ndice, nsides, values);
        Ok(values
            .into_iter()
            .map(|v| RolledDie::polyhedral(v, nsides))
            .collect())
    }

    pub async fn roll_one(&mut self, nsides: Int) -> Result<RolledDie, RollerError> {
        let values = self.inner.roll(1, nsides, 1, DieKind::Polyhedral).await?;
        let value = values.into_iter().next().ok_or(RollerError::Exhausted)?;
        Ok(RolledDie::polyhedral(value, nsides))
    }

    pub async fn roll_fudge(&mut self, ndice: Int) -> Result<Vec<RolledDie>, RollerError> {
        let values = self
            .inner
            .roll_vals(ndice, &FUDGE_FACES, DieKind::Fudge)
            .await?;
        debug!("rolled {}dF: {:?}", ndice, values);
        Ok(values.into_iter().map(RolledDie::fudge).collect())
    }

    /// Two d6 per die, composed as `tens * 10 + ones`; the source dice ride
    /// along on the composed die's `from` edges.
    pub async fn roll_d66(&mut self, ndice: Int) -> Result<Vec<RolledDie>, RollerError> {
        check_ndice(ndice)?;
        let mut out = Vec::with_capacity(ndice as usize);
        for _ in 0..ndice {
            let pair = self.inner.roll(2, 6, 1, DieKind::D66).await?;
            let (tens, ones) = (pair[0], pair[1]);
            out.push(RolledDie::d66(
                tens * 10 + ones,
                RolledDie::polyhedral(tens, 6),
                RolledDie::polyhedral(ones, 6),
            ));
        }
        debug!(
            "rolled {}D66: {:?}",
            ndice,
            out.iter().map(|d| d.result).collect::<Vec<_>>()
        );
        Ok(out)
    }

    pub async fn roll_vals(
        &mut self,
        ndice: Int,
        vals: &[Int],
    ) -> Result<Vec<RolledDie>, RollerError> {
        let values = self.inner.roll_vals(ndice, vals, DieKind::NVals).await?;
        debug!("rolled {}d{:?}: {:?}", ndice, vals, values);
        Ok(values.into_iter().map(|v| RolledDie::nvals(v, vals)).collect())
    }

    /// A fresh die of the same specification as `die`.
    pub async fn roll_like(&mut self, die: &RolledDie) -> Result<RolledDie, RollerError> {
        match die.kind {
            DieKind::Polyhedral => self.roll_one(die.nsides).await,
            DieKind::D66 => {
                let mut dice = self.roll_d66(1).await?;
                dice.pop().ok_or(RollerError::Exhausted)
            }
            DieKind::Fudge | DieKind::NVals | DieKind::SingleVal => {
                let values = self
                    .inner
                    .roll_vals(1, &die.potential_values, die.kind)
                    .await?;
                let value = values.into_iter().next().ok_or(RollerError::Exhausted)?;
                Ok(match die.kind {
                    DieKind::Fudge => RolledDie::fudge(value),
                    DieKind::SingleVal => RolledDie::single(value),
                    _ => RolledDie::nvals(value, &die.potential_values),
                })
            }
        }
    }
}
