// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Serial or data-parallel iteration over sites.
//!
//! Sites are independent in every kernel, so the same closure runs either
//! on the calling thread or across the current rayon pool.

use rayon::prelude::*;

/// How a kernel walks its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    /// One thread, in order.
    #[default]
    Serial,
    /// Chunks spread over the current rayon pool.
    Parallel,
}

impl Execution {
    /// Calls `f(index, chunk)` for every `chunk`-sized piece of `data`.
    pub fn for_each_chunk<F>(self, data: &mut [f64], chunk: usize, f: F)
    where
        F: Fn(usize, &mut [f64]) + Send + Sync,
    {
        match self {
            Self::Serial => data
                .chunks_mut(chunk)
                .enumerate()
                .for_each(|(i, c)| f(i, c)),
            Self::Parallel => data
                .par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(i, c)| f(i, c)),
        }
    }

    /// Calls `f(index, value)` for every element of `data`.
    pub fn for_each_value<F>(self, data: &mut [f64], f: F)
    where
        F: Fn(usize, &mut f64) + Send + Sync,
    {
        match self {
            Self::Serial => data.iter_mut().enumerate().for_each(|(i, v)| f(i, v)),
            Self::Parallel => data.par_iter_mut().enumerate().for_each(|(i, v)| f(i, v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_and_parallel_agree() {
        let mut a = vec![0.0; 12];
        let mut b = vec![0.0; 12];
        let fill = |i: usize, c: &mut [f64]| {
            for (k, v) in c.iter_mut().enumerate() {
                *v = (i * 10 + k) as f64;
            }
        };
        Execution::Serial.for_each_chunk(&mut a, 3, fill);
        Execution::Parallel.for_each_chunk(&mut b, 3, fill);
        assert_eq!(a, b);
        assert_eq!(a[4], 11.0);
    }

    #[test]
    fn test_for_each_value() {
        let mut a = vec![0.0; 5];
        Execution::Parallel.for_each_value(&mut a, |i, v| *v = i as f64 * 2.0);
        assert_eq!(a, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }
}
