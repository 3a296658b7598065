use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::dsranges_structs::Interval;
use crate::invrep::{InvRepeat, StemSegment};
use crate::merge::sweep_line_merge;
use crate::nearest::BoundaryIndex;

fn intervals(starts: &[i64], ends: &[i64]) -> PyResult<Vec<Interval>> {
    if starts.len() != ends.len() {
        return Err(PyValueError::new_err("starts and ends differ in length"));
    }
    starts
        .iter()
        .zip(ends)
        .map(|(&s, &e)| Interval::try_new(s, e).map_err(|e| PyValueError::new_err(e.to_string())))
        .collect()
}

#[pyfunction]
#[pyo3(signature = (starts, ends, slack=0))]
pub fn merge_numpy(
    py: Python,
    starts: PyReadonlyArray1<i64>,
    ends: PyReadonlyArray1<i64>,
    slack: i64,
) -> PyResult<(Py<PyArray1<i64>>, Py<PyArray1<i64>>, Py<PyArray1<i64>>)> {
    let intervals = intervals(starts.as_slice()?, ends.as_slice()?)?;
    let (merged, counts) = sweep_line_merge(&intervals, slack);

    let starts: Vec<i64> = merged.iter().map(|x| x.start).collect();
    let ends: Vec<i64> = merged.iter().map(|x| x.end).collect();
    let counts: Vec<i64> = counts.into_iter().map(|x| x as i64).collect();
    Ok((
        starts.into_pyarray(py).to_owned().into(),
        ends.into_pyarray(py).to_owned().into(),
        counts.into_pyarray(py).to_owned().into(),
    ))
}

/// For each `(a[i], b[i])`, whether an insulator lies between the two positions.
#[pyfunction]
pub fn separates_numpy(
    py: Python,
    boundaries: PyReadonlyArray1<i64>,
    a: PyReadonlyArray1<i64>,
    b: PyReadonlyArray1<i64>,
) -> PyResult<(Py<PyArray1<bool>>, Py<PyArray1<i64>>)> {
    let a = a.as_slice()?;
    let b = b.as_slice()?;
    if a.len() != b.len() {
        return Err(PyValueError::new_err("a and b differ in length"));
    }
    let index = BoundaryIndex::new(boundaries.as_slice()?.iter().copied());

    let separated: Vec<bool> = a.iter().zip(b).map(|(&x, &y)| index.separates(x, y)).collect();
    let crossings: Vec<i64> = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| index.crossings(x, y) as i64)
        .collect();
    Ok((
        separated.into_pyarray(py).to_owned().into(),
        crossings.into_pyarray(py).to_owned().into(),
    ))
}

/// Map unrolled ranges of one structure back to genomic segments. Returns
/// the range index of every produced segment plus its arm coordinates.
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
#[pyfunction]
pub fn from_unrolled_numpy(
    py: Python,
    left_starts: PyReadonlyArray1<i64>,
    left_ends: PyReadonlyArray1<i64>,
    right_starts: PyReadonlyArray1<i64>,
    right_ends: PyReadonlyArray1<i64>,
    starts: PyReadonlyArray1<i64>,
    ends: PyReadonlyArray1<i64>,
) -> PyResult<(
    Py<PyArray1<i64>>,
    Py<PyArray1<i64>>,
    Py<PyArray1<i64>>,
    Py<PyArray1<i64>>,
    Py<PyArray1<i64>>,
)> {
    let lefts = intervals(left_starts.as_slice()?, left_ends.as_slice()?)?;
    let rights = intervals(right_starts.as_slice()?, right_ends.as_slice()?)?;
    if lefts.len() != rights.len() {
        return Err(PyValueError::new_err("left and right arms differ in count"));
    }
    let segments = lefts
        .into_iter()
        .zip(rights)
        .map(|(l, r)| StemSegment::new(l, r))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let rna = InvRepeat::new(segments).map_err(|e| PyValueError::new_err(e.to_string()))?;

    let ranges = intervals(starts.as_slice()?, ends.as_slice()?)?;
    let mapped = rna
        .from_unrolled(&ranges)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let mut idxs = Vec::new();
    let (mut ls, mut le, mut rs, mut re) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for (ind, fragment) in mapped.iter().enumerate() {
        for segment in fragment.segments() {
            idxs.push(ind as i64);
            ls.push(segment.left.start);
            le.push(segment.left.end);
            rs.push(segment.right.start);
            re.push(segment.right.end);
        }
    }
    Ok((
        idxs.into_pyarray(py).to_owned().into(),
        ls.into_pyarray(py).to_owned().into(),
        le.into_pyarray(py).to_owned().into(),
        rs.into_pyarray(py).to_owned().into(),
        re.into_pyarray(py).to_owned().into(),
    ))
}

#[pymodule]
fn dsranges(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(merge_numpy, m)?)?;
    m.add_function(wrap_pyfunction!(separates_numpy, m)?)?;
    m.add_function(wrap_pyfunction!(from_unrolled_numpy, m)?)?;
    Ok(())
}
