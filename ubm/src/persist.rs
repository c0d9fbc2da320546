use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::model::{GaussianComponent, MixtureModel, Normalization};
use crate::{Config, UbmError};

/// Writes the model in the line-oriented text format:
///
/// ```text
/// dim num_components
/// normalization_mean normalization_std
/// weight                       x num_components
/// mean_0 ... mean_{dim-1}      x num_components
/// var_0 ... var_{dim-1}        x num_components
/// ```
///
/// Values use the shortest decimal form that parses back to the same `f64`,
/// so a save/load round trip is exact.
pub fn save(model: &MixtureModel, w: &mut dyn Write) -> Result<(), UbmError> {
    let mut bw = BufWriter::new(w);
    let write_err = |e: std::io::Error| UbmError::Io(e.to_string());

    let norm = model.normalization();
    writeln!(bw, "{} {}", model.dim(), model.num_components()).map_err(write_err)?;
    writeln!(bw, "{} {}", norm.mean, norm.std).map_err(write_err)?;

    for c in model.components() {
        writeln!(bw, "{}", c.weight).map_err(write_err)?;
    }
    for c in model.components() {
        write_row(&mut bw, &c.mean).map_err(write_err)?;
    }
    for c in model.components() {
        write_row(&mut bw, &c.var).map_err(write_err)?;
    }
    bw.flush().map_err(write_err)?;
    Ok(())
}

fn write_row(w: &mut impl Write, row: &[f64]) -> std::io::Result<()> {
    for (i, v) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b" ")?;
        }
        write!(w, "{v}")?;
    }
    w.write_all(b"\n")
}

/// Reads a model written by [`save`]. The result is in phase `Trained`.
///
/// Content after the last variance is ignored.
pub fn load(r: &mut dyn Read) -> Result<MixtureModel, UbmError> {
    let mut text = String::new();
    BufReader::new(r)
        .read_to_string(&mut text)
        .map_err(|e| UbmError::Io(e.to_string()))?;
    let mut tokens = Tokens::new(&text);

    let dim: usize = tokens.next("dim")?;
    let num: usize = tokens.next("num_components")?;
    let cfg = Config::new(dim, num).map_err(|e| UbmError::InvalidFormat(e.to_string()))?;

    let norm = Normalization {
        mean: tokens.next("normalization mean")?,
        std: tokens.next("normalization std")?,
    };

    // Sizes come from an untrusted header; grow only as tokens arrive.
    let mut components: Vec<GaussianComponent> = Vec::new();
    for _ in 0..num {
        components.push(GaussianComponent {
            mean: Vec::new(),
            var: Vec::new(),
            weight: tokens.next("weight")?,
            count: 0,
        });
    }
    for c in components.iter_mut() {
        for _ in 0..dim {
            c.mean.push(tokens.next("mean")?);
        }
    }
    for c in components.iter_mut() {
        for _ in 0..dim {
            c.var.push(tokens.next("variance")?);
        }
    }

    let mut model = MixtureModel::from_components(cfg.dim, components)?;
    model.set_normalization(norm);
    Ok(model)
}

/// Saves the model to `path`, replacing any existing file.
pub fn save_file(model: &MixtureModel, path: impl AsRef<Path>) -> Result<(), UbmError> {
    let path = path.as_ref();
    let mut f = File::create(path).map_err(|e| UbmError::from_io(path, e))?;
    save(model, &mut f)?;
    tracing::info!("ubm: model saved to {}", path.display());
    Ok(())
}

/// Loads a model from `path`.
pub fn load_file(path: impl AsRef<Path>) -> Result<MixtureModel, UbmError> {
    let path = path.as_ref();
    let mut f = File::open(path).map_err(|e| UbmError::from_io(path, e))?;
    let model = load(&mut f).map_err(|e| match e {
        UbmError::InvalidFormat(msg) => {
            UbmError::InvalidFormat(format!("{}: {msg}", path.display()))
        }
        other => other,
    })?;
    tracing::info!("ubm: model loaded from {}", path.display());
    Ok(model)
}

/// Whitespace token reader with positional error messages.
struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_whitespace(),
            pos: 0,
        }
    }

    fn next<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, UbmError> {
        self.pos += 1;
        let tok = self.iter.next().ok_or_else(|| {
            UbmError::InvalidFormat(format!("token {}: missing {what}", self.pos))
        })?;
        tok.parse().map_err(|_| {
            UbmError::InvalidFormat(format!("token {}: bad {what}: {tok:?}", self.pos))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_model() -> MixtureModel {
        let mut m = MixtureModel::from_components(
            3,
            vec![
                GaussianComponent {
                    mean: vec![0.1, -2.5, 1e-7],
                    var: vec![0.3333333333333333, 2.0, 1e-12],
                    weight: 0.7,
                    count: 4,
                },
                GaussianComponent {
                    mean: vec![std::f64::consts::PI, 12345.678, -0.0],
                    var: vec![1.0, 0.1, 7.25],
                    weight: 0.30000000000000004,
                    count: 2,
                },
            ],
        )
        .unwrap();
        m.set_normalization(Normalization {
            mean: -10.123456789,
            std: 2.0f64.sqrt(),
        });
        m
    }

    #[test]
    fn round_trip_is_exact() {
        let m = sample_model();
        let mut buf = Vec::new();
        save(&m, &mut buf).unwrap();
        let back = load(&mut Cursor::new(buf)).unwrap();

        assert_eq!(back.dim(), 3);
        assert_eq!(back.num_components(), 2);
        assert_eq!(back.normalization(), m.normalization());
        for (a, b) in back.components().iter().zip(m.components()) {
            assert_eq!(a.weight.to_bits(), b.weight.to_bits());
            for (x, y) in a.mean.iter().zip(&b.mean).chain(a.var.iter().zip(&b.var)) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
            assert_eq!(a.count, 0);
        }
    }

    #[test]
    fn layout() {
        let m = MixtureModel::from_components(
            2,
            vec![GaussianComponent {
                mean: vec![1.0, 2.5],
                var: vec![0.5, 4.0],
                weight: 1.0,
                count: 0,
            }],
        )
        .unwrap();
        let mut buf = Vec::new();
        save(&m, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "2 1\n0 0\n1\n1 2.5\n0.5 4\n");
    }

    #[test]
    fn reads_legacy_trailing_spaces() {
        let text = "1 2\n-3.5 0.5\n0.4\n0.6\n1 \n2 \n0.25 \n0.5 \n\n";
        let m = load(&mut Cursor::new(text)).unwrap();
        assert_eq!(m.weights(), vec![0.4, 0.6]);
        assert_eq!(m.components()[1].mean, vec![2.0]);
        assert_eq!(m.components()[0].var, vec![0.25]);
        assert_eq!(m.normalization().mean, -3.5);
    }

    #[test]
    fn truncated_payload_is_invalid() {
        let text = "2 2\n0 0\n0.5\n0.5\n1 2\n3\n";
        let err = load(&mut Cursor::new(text)).unwrap_err();
        assert!(matches!(err, UbmError::InvalidFormat(_)), "got {err:?}");
    }

    #[test]
    fn bad_header_is_invalid() {
        for text in ["x 2\n", "0 2\n0 0\n", "2 0\n0 0\n"] {
            let err = load(&mut Cursor::new(text)).unwrap_err();
            assert!(matches!(err, UbmError::InvalidFormat(_)), "{text:?}: {err:?}");
        }
    }

    #[test]
    fn oversized_header_is_invalid() {
        for text in [
            "2 99999999999999999\n0 0\n0.5\n",
            "99999999999999999 1\n0 0\n1\n1 2\n",
        ] {
            let err = load(&mut Cursor::new(text)).unwrap_err();
            assert!(matches!(err, UbmError::InvalidFormat(_)), "{text:?}: {err:?}");
        }
    }

    #[test]
    fn file_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ubm.model");
        let m = sample_model();
        save_file(&m, &path).unwrap();
        let back = load_file(&path).unwrap();
        assert_eq!(back.summary().means, m.summary().means);

        let err = load_file(dir.path().join("missing.model")).unwrap_err();
        assert!(matches!(err, UbmError::NotFound { .. }), "got {err:?}");
    }
}
