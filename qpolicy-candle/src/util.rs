//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Tensor, Var, WithDType};
use candle_nn::VarMap;
use log::trace;
use ndarray::ArrayD;
use num_traits::AsPrimitive;
use qpolicy_core::PolicyError;
use std::{collections::HashMap, sync::MutexGuard};

fn lock(varmap: &VarMap) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))
}

/// Overwrites all variables in `dest` with the values of the same name in `src`.
///
/// Both must hold the same set of variable names with the same shapes.
pub fn copy_vars(dest: &VarMap, src: &VarMap) -> Result<()> {
    track(dest, src, 1.0)
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
///
/// With `tau == 1` the values of `src` are copied as they are. Names and shapes
/// are checked before any variable is written, so `dest` is left untouched on
/// error. `dest` and `src` must not share their storage.
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    if std::ptr::eq(dest.data(), src.data()) {
        return Err(PolicyError::Configuration(
            "destination and source of a variable update are the same".to_string(),
        )
        .into());
    }

    trace!("dest");
    let dest = lock(dest)?;
    trace!("src");
    let src = lock(src)?;

    if dest.len() != src.len() {
        return Err(PolicyError::Configuration(format!(
            "variable count differs: {} in destination, {} in source",
            dest.len(),
            src.len()
        ))
        .into());
    }

    let pairs = dest
        .iter()
        .map(|(k, v_dest)| {
            let v_src = src
                .get(k)
                .ok_or_else(|| PolicyError::UnknownParameter(k.clone()))?;
            if v_src.dims() != v_dest.dims() {
                return Err(PolicyError::DimensionMismatch {
                    expected: v_dest.dims().to_vec(),
                    got: v_src.dims().to_vec(),
                });
            }
            Ok((v_dest, v_src.as_tensor()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (v_dest, t_src) in pairs {
        if tau == 1.0 {
            v_dest.set(t_src)?;
        } else {
            let t_dest = ((tau * t_src)? + ((1.0 - tau) * v_dest.as_tensor())?)?;
            v_dest.set(&t_dest)?;
        }
    }

    Ok(())
}

/// Returns copies of the variables as `(name, tensor)` pairs sorted by name.
pub fn named_tensors(varmap: &VarMap) -> Result<Vec<(String, Tensor)>> {
    let vars = lock(varmap)?;
    let mut tensors = vars
        .iter()
        .map(|(k, v)| -> Result<(String, Tensor)> { Ok((k.clone(), v.as_tensor().copy()?)) })
        .collect::<Result<Vec<_>>>()?;
    tensors.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(tensors)
}

/// Overwrites the variable `name` in `varmap` with `value`.
pub fn set_var(varmap: &VarMap, name: &str, value: &Tensor) -> Result<()> {
    let vars = lock(varmap)?;
    let var = vars
        .get(name)
        .ok_or_else(|| PolicyError::UnknownParameter(name.to_string()))?;
    var.set(value)?;

    Ok(())
}

/// Returns the index of the maximum in each row of a 2-D `f32` tensor.
///
/// Among tied maxima the lowest index is taken. NaN is greater than any
/// number, so the first NaN in a row wins.
pub fn argmax_rows(xs: &Tensor) -> Result<Vec<i64>> {
    let rows: Vec<Vec<f32>> = xs.to_vec2()?;

    Ok(rows
        .iter()
        .map(|row| {
            let mut best = 0;
            for (i, v) in row.iter().enumerate() {
                if row[best].is_nan() {
                    break;
                }
                if v.is_nan() || *v > row[best] {
                    best = i;
                }
            }
            best as i64
        })
        .collect())
}

/// Converts an array into a tensor, optionally adding the batch dimension.
pub fn arrayd_to_tensor<T1, T2>(a: ArrayD<T1>, add_batch_dim: bool) -> Result<Tensor>
where
    T1: AsPrimitive<T2>,
    T2: WithDType,
{
    let shape = a.shape().to_vec();
    let v = a.iter().map(|e| e.as_()).collect::<Vec<T2>>();
    let t = Tensor::from_vec(v, shape, &candle_core::Device::Cpu)?;

    match add_batch_dim {
        true => Ok(t.unsqueeze(0)?),
        false => Ok(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::Init;

    fn varmap_with(values: &[f32]) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        vm.get((values.len(),), "var1", init, DType::F32, &Device::Cpu)?;
        set_var(&vm, "var1", &Tensor::from_slice(values, (values.len(),), &Device::Cpu)?)?;
        Ok(vm)
    }

    fn values(vm: &VarMap) -> Result<Vec<f32>> {
        let ts = named_tensors(vm)?;
        Ok(ts[0].1.to_vec1()?)
    }

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let vm_src = varmap_with(&[1.0, 2.0, 3.0])?;
        let vm_dest = varmap_with(&[4.0, 5.0, 6.0])?;
        track(&vm_dest, &vm_src, tau)?;

        let expected = [1.9f32, 2.9, 3.9];
        for (x, y) in values(&vm_dest)?.iter().zip(expected.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_copy_vars() -> Result<()> {
        let vm_src = varmap_with(&[1.0, 2.0, 3.0])?;
        let vm_dest = varmap_with(&[4.0, 5.0, 6.0])?;
        copy_vars(&vm_dest, &vm_src)?;
        assert_eq!(values(&vm_dest)?, vec![1.0, 2.0, 3.0]);

        // The copy does not alias the source
        set_var(&vm_src, "var1", &Tensor::zeros((3,), DType::F32, &Device::Cpu)?)?;
        assert_eq!(values(&vm_dest)?, vec![1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_copy_vars_unknown_name() -> Result<()> {
        let vm_src = varmap_with(&[1.0])?;
        let vm_dest = VarMap::new();
        vm_dest.get((1,), "other", Init::Const(0.0), DType::F32, &Device::Cpu)?;
        let err = copy_vars(&vm_dest, &vm_src).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PolicyError>(),
            Some(&PolicyError::UnknownParameter("other".to_string()))
        );
        Ok(())
    }

    #[test]
    fn test_copy_vars_leaves_dest_on_error() -> Result<()> {
        let vm_src = VarMap::new();
        vm_src.get((2,), "a", Init::Const(1.0), DType::F32, &Device::Cpu)?;
        vm_src.get((2,), "b", Init::Const(1.0), DType::F32, &Device::Cpu)?;
        let vm_dest = VarMap::new();
        vm_dest.get((2,), "a", Init::Const(0.0), DType::F32, &Device::Cpu)?;
        vm_dest.get((3,), "b", Init::Const(0.0), DType::F32, &Device::Cpu)?;

        let err = copy_vars(&vm_dest, &vm_src).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PolicyError>(),
            Some(PolicyError::DimensionMismatch { .. })
        ));
        for (_, t) in named_tensors(&vm_dest)? {
            let xs: Vec<f32> = t.to_vec1()?;
            assert!(xs.iter().all(|&x| x == 0.0));
        }
        Ok(())
    }

    #[test]
    fn test_track_same_varmap_is_rejected() -> Result<()> {
        let vm = varmap_with(&[1.0, 2.0])?;
        assert!(copy_vars(&vm, &vm).is_err());

        // Clones share the variables
        let vm_ = vm.clone();
        assert!(track(&vm_, &vm, 0.5).is_err());
        assert_eq!(values(&vm)?, vec![1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_argmax_rows_nan_is_maximum() -> Result<()> {
        let nan = f32::NAN;
        let xs = Tensor::from_slice(
            &[0.1f32, nan, 0.9, nan, nan, 2.0, 1.0, 3.0, 1.0, 1.0, 1.0, nan],
            (3, 4),
            &Device::Cpu,
        )?;
        assert_eq!(argmax_rows(&xs)?, vec![1, 0, 3]);
        Ok(())
    }

    #[test]
    fn test_argmax_rows_lowest_index() -> Result<()> {
        let xs = Tensor::from_slice(
            &[0.1f32, 0.9, 0.9, 0.2, 1.0, 1.0, 1.0, 1.0, -3.0, -1.0, -2.0, -1.0],
            (3, 4),
            &Device::Cpu,
        )?;
        assert_eq!(argmax_rows(&xs)?, vec![1, 0, 1]);
        Ok(())
    }
}
