//! Set partitions and the orbit basis of permutation-equivariant maps.
//!
//! Linear maps `V_n^{⊗k} → V_n^{⊗l}` commuting with S(n) are spanned by
//! one basis element per set partition of the `l + k` tensor indices.
//! The orbit basis element of a partition is the indicator of index
//! tuples whose equality pattern is exactly that partition. Elements with
//! more blocks than `n` vanish, and the nonzero ones are linearly
//! independent, so the same coefficients define a map at every level.
//!
//! A partition is *pad consistent* when every block holding an output
//! index also holds an input index. Those elements map a zero-padded
//! input to a zero-padded output, so a stack of them at level `n + 1`
//! restricted to the first `n` coordinates is the same stack at level `n`.

use ndarray::Array2;
use std::collections::HashMap;

/// All set partitions of `m` elements as restricted growth strings.
///
/// Element `i` belongs to block `p[i]`; blocks are numbered in order of
/// first appearance. The count is the Bell number `B(m)`.
pub fn set_partitions(m: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(m);
    extend_partitions(m, &mut current, 0, &mut out);
    out
}

fn extend_partitions(m: usize, current: &mut Vec<usize>, blocks: usize, out: &mut Vec<Vec<usize>>) {
    if current.len() == m {
        out.push(current.clone());
        return;
    }
    for label in 0..=blocks {
        current.push(label);
        let next_blocks = if label == blocks { blocks + 1 } else { blocks };
        extend_partitions(m, current, next_blocks, out);
        current.pop();
    }
}

/// Number of blocks in a restricted growth string
pub fn block_count(partition: &[usize]) -> usize {
    partition.iter().max().map_or(0, |&b| b + 1)
}

/// Whether every output block of `partition` reaches an input index.
///
/// Positions `..k_out` are output indices, the rest are inputs.
pub fn is_pad_consistent(partition: &[usize], k_out: usize) -> bool {
    let (outputs, inputs) = partition.split_at(k_out.min(partition.len()));
    outputs.iter().all(|block| inputs.contains(block))
}

/// Canonical equality pattern of an index tuple
fn equality_pattern(tuple: &[usize]) -> Vec<usize> {
    let mut seen: Vec<usize> = Vec::with_capacity(tuple.len());
    tuple
        .iter()
        .map(|value| match seen.iter().position(|v| v == value) {
            Some(label) => label,
            None => {
                seen.push(*value);
                seen.len() - 1
            }
        })
        .collect()
}

/// Orbit basis for maps from order-`k_in` to order-`k_out` tensors over `R^n`.
///
/// Returns one `n^k_out × n^k_in` matrix per entry of
/// `set_partitions(k_out + k_in)`, output indices first. Tensors are
/// flattened row-major.
pub fn orbit_basis(k_in: usize, k_out: usize, n: usize) -> Vec<Array2<f64>> {
    let m = k_in + k_out;
    let partitions = set_partitions(m);
    let lookup: HashMap<Vec<usize>, usize> = partitions
        .iter()
        .enumerate()
        .map(|(i, p)| (p.clone(), i))
        .collect();

    let rows = n.pow(k_out as u32);
    let cols = n.pow(k_in as u32);
    let mut basis = vec![Array2::zeros((rows, cols)); partitions.len()];
    if n == 0 {
        return basis;
    }

    let mut tuple = vec![0usize; m];
    loop {
        let pattern = equality_pattern(&tuple);
        let row = flat_index(&tuple[..k_out], n);
        let col = flat_index(&tuple[k_out..], n);
        basis[lookup[&pattern]][(row, col)] = 1.0;

        // odometer increment, last index fastest
        let mut pos = m;
        loop {
            if pos == 0 {
                return basis;
            }
            pos -= 1;
            tuple[pos] += 1;
            if tuple[pos] < n {
                break;
            }
            tuple[pos] = 0;
        }
    }
}

fn flat_index(indices: &[usize], n: usize) -> usize {
    indices.iter().fold(0, |acc, &i| acc * n + i)
}
