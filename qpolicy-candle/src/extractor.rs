//! Feature extractors.
//!
//! A feature extractor maps raw observations to a batch of flat feature
//! vectors of a fixed width, consumed by [`QValueNetwork`](crate::dqn::QValueNetwork).
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use qpolicy_core::{Discrete, PolicyError, Space};

/// Transform from observations to fixed-width feature vectors.
pub trait FeatureExtractor: Send + Sync {
    /// Width of the feature vectors.
    fn features_dim(&self) -> usize;

    /// Checks the shape of `obs` and returns its batch size.
    ///
    /// Returns `None` if `obs` is a single observation without the batch dimension.
    fn batch_size(&self, obs: &Tensor) -> Result<Option<usize>>;

    /// Returns features of shape `[batch, features_dim]`.
    ///
    /// A single observation is treated as a batch of size one.
    fn extract(&self, obs: &Tensor) -> Result<Tensor>;
}

/// Flattens observations.
///
/// Box observations are flattened in row-major order and, if `normalize_images`
/// is set and the space holds images, scaled into `[0, 1]`. Discrete
/// observations are one-hot encoded.
pub struct FlattenExtractor {
    observation_space: Space,
    normalize_images: bool,
    device: Device,
}

impl FlattenExtractor {
    /// Constructs the extractor for an observation space.
    pub fn new(observation_space: Space, normalize_images: bool, device: Device) -> Self {
        Self {
            observation_space,
            normalize_images,
            device,
        }
    }

    /// Encodes discrete observations, each of which must be an integer in `0..n`.
    fn one_hot(&self, obs: &Tensor, batch_size: usize, space: &Discrete) -> Result<Tensor> {
        let values: Vec<f64> = obs.to_dtype(DType::F64)?.flatten_all()?.to_vec1()?;
        let ixs = values
            .iter()
            .map(|&v| match v.fract() == 0.0 && space.contains(v as i64) {
                true => Ok(v as u32),
                false => Err(PolicyError::InvalidObservation(format!(
                    "{} is not an element of {{0, ..., {}}}",
                    v,
                    space.n.saturating_sub(1)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let n = space.n;
        let ixs = Tensor::from_vec(ixs, (batch_size, 1), &self.device)?;
        let range = Tensor::arange(0u32, n as u32, &self.device)?.reshape((1, n))?;
        Ok(ixs.broadcast_eq(&range)?.to_dtype(DType::F32)?)
    }
}

impl FeatureExtractor for FlattenExtractor {
    fn features_dim(&self) -> usize {
        self.observation_space.dimensionality()
    }

    fn batch_size(&self, obs: &Tensor) -> Result<Option<usize>> {
        let expected = self.observation_space.shape();
        let dims = obs.dims();

        if dims == &expected[..] {
            Ok(None)
        } else if dims.len() == expected.len() + 1 && dims[1..] == expected[..] {
            Ok(Some(dims[0]))
        } else {
            Err(PolicyError::DimensionMismatch {
                expected,
                got: dims.to_vec(),
            }
            .into())
        }
    }

    fn extract(&self, obs: &Tensor) -> Result<Tensor> {
        let batch_size = self.batch_size(obs)?.unwrap_or(1);

        match &self.observation_space {
            Space::Discrete(d) => self.one_hot(obs, batch_size, d),
            Space::Box(b) => {
                let xs = obs
                    .to_device(&self.device)?
                    .to_dtype(DType::F32)?
                    .reshape((batch_size, b.numel()))?;
                match self.normalize_images && b.is_image() {
                    true => Ok(xs.affine(1.0 / 255.0, 0.0)?),
                    false => Ok(xs),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpolicy_core::BoxSpace;

    #[test]
    fn test_flatten_box() -> Result<()> {
        let ex = FlattenExtractor::new(Space::boxed(vec![2, 3], -1.0, 1.0), true, Device::Cpu);
        assert_eq!(ex.features_dim(), 6);

        let obs = Tensor::ones((2, 3), DType::F32, &Device::Cpu)?;
        assert_eq!(ex.batch_size(&obs)?, None);
        assert_eq!(ex.extract(&obs)?.dims(), &[1, 6]);

        let obs = Tensor::ones((5, 2, 3), DType::F32, &Device::Cpu)?;
        assert_eq!(ex.batch_size(&obs)?, Some(5));
        assert_eq!(ex.extract(&obs)?.dims(), &[5, 6]);
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch() -> Result<()> {
        let ex = FlattenExtractor::new(Space::boxed(vec![4], -1.0, 1.0), true, Device::Cpu);
        let obs = Tensor::ones((2, 3), DType::F32, &Device::Cpu)?;
        let err = ex.extract(&obs).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PolicyError>(),
            Some(&PolicyError::DimensionMismatch {
                expected: vec![4],
                got: vec![2, 3]
            })
        );
        Ok(())
    }

    #[test]
    fn test_normalize_images() -> Result<()> {
        let space = Space::Box(BoxSpace::image(vec![2, 2, 1]));
        let obs = Tensor::from_slice(&[0u8, 51, 102, 255], (2, 2, 1), &Device::Cpu)?;

        let ex = FlattenExtractor::new(space.clone(), true, Device::Cpu);
        let xs: Vec<Vec<f32>> = ex.extract(&obs)?.to_vec2()?;
        for (x, y) in xs[0].iter().zip([0.0f32, 0.2, 0.4, 1.0]) {
            assert!((x - y).abs() < 1e-6);
        }

        let ex = FlattenExtractor::new(space, false, Device::Cpu);
        let xs: Vec<Vec<f32>> = ex.extract(&obs)?.to_vec2()?;
        assert_eq!(xs, vec![vec![0.0, 51.0, 102.0, 255.0]]);
        Ok(())
    }

    #[test]
    fn test_one_hot() -> Result<()> {
        let ex = FlattenExtractor::new(Space::discrete(3), true, Device::Cpu);
        let obs = Tensor::from_slice(&[2i64, 0], (2,), &Device::Cpu)?;
        let xs: Vec<Vec<f32>> = ex.extract(&obs)?.to_vec2()?;
        assert_eq!(xs, vec![vec![0.0, 0.0, 1.0], vec![1.0, 0.0, 0.0]]);

        let obs = Tensor::new(1i64, &Device::Cpu)?;
        assert_eq!(ex.batch_size(&obs)?, None);
        let xs: Vec<Vec<f32>> = ex.extract(&obs)?.to_vec2()?;
        assert_eq!(xs, vec![vec![0.0, 1.0, 0.0]]);
        Ok(())
    }

    #[test]
    fn test_one_hot_rejects_invalid_values() -> Result<()> {
        let ex = FlattenExtractor::new(Space::discrete(5), true, Device::Cpu);
        let invalid = [
            Tensor::new(7i64, &Device::Cpu)?,
            Tensor::new(-1i64, &Device::Cpu)?,
            Tensor::new(1.7f32, &Device::Cpu)?,
            Tensor::from_slice(&[0i64, 5], (2,), &Device::Cpu)?,
        ];
        for obs in invalid.iter() {
            let err = ex.extract(obs).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PolicyError>(),
                Some(PolicyError::InvalidObservation(_))
            ));
        }

        // Integral floats are accepted
        let obs = Tensor::from_slice(&[4.0f32, 0.0], (2,), &Device::Cpu)?;
        let xs: Vec<Vec<f32>> = ex.extract(&obs)?.to_vec2()?;
        assert_eq!(xs[0], vec![0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(xs[1], vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        Ok(())
    }
}
