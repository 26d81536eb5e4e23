//! Command-line JAGS backend.
//!
//! Writes the model, data, per-chain initial values and a batch script into a
//! caller-supplied working directory, runs `jags script.cmd`, and reads the CODA
//! files it leaves behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::draws::PosteriorDraws;
use super::sampler::{
    DataBindings, DataValue, InitialValues, Sampler, SamplerError, SamplerOutput, SamplerRequest,
};

pub const MODEL_FILE: &str = "model.jags";
pub const DATA_FILE: &str = "data.R";
pub const SCRIPT_FILE: &str = "script.cmd";
pub const CODA_STEM: &str = "CODA";

/// Default JAGS random number generator for chain streams.
pub const DEFAULT_RNG: &str = "base::Mersenne-Twister";

/// Substrings JAGS prints when a script command fails.
const ERROR_MARKERS: [&str; 4] = [
    "RUNTIME ERROR",
    "Compilation error",
    "Error parsing",
    "Can't",
];

/// Runs the `jags` executable in batch mode.
#[derive(Debug, Clone)]
pub struct JagsSampler {
    executable: PathBuf,
    work_dir: PathBuf,
}

impl JagsSampler {
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: PathBuf::from("jags"),
            work_dir: work_dir.into(),
        }
    }

    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Write every input file JAGS needs for `request`.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError::Io` when the working directory cannot be written.
    pub fn prepare(&self, request: &SamplerRequest<'_>) -> Result<(), SamplerError> {
        fs::create_dir_all(&self.work_dir).map_err(|source| self.io_error(source))?;
        self.write(MODEL_FILE, request.model)?;
        self.write(DATA_FILE, &render_data(request.data))?;
        for (chain, inits) in request.inits.iter().enumerate() {
            self.write(&inits_file(chain + 1), &render_inits(inits))?;
        }
        self.write(SCRIPT_FILE, &render_script(request))?;
        Ok(())
    }

    fn write(&self, file: &str, contents: &str) -> Result<(), SamplerError> {
        fs::write(self.work_dir.join(file), contents).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> SamplerError {
        SamplerError::Io {
            path: self.work_dir.clone(),
            source,
        }
    }

    fn read_draws(&self, request: &SamplerRequest<'_>) -> Result<PosteriorDraws, SamplerError> {
        let index_path = self.work_dir.join(format!("{CODA_STEM}index.txt"));
        let index = fs::read_to_string(&index_path).map_err(|source| self.io_error(source))?;
        let chain_texts = (1..=request.schedule.chains)
            .map(|chain| {
                let path = self.work_dir.join(format!("{CODA_STEM}chain{chain}.txt"));
                fs::read_to_string(path).map_err(|source| self.io_error(source))
            })
            .collect::<Result<Vec<_>, _>>()?;
        parse_coda(&index, &chain_texts, request.schedule.retained_draws())
    }
}

impl Sampler for JagsSampler {
    fn sample(&self, request: &SamplerRequest<'_>) -> Result<SamplerOutput, SamplerError> {
        self.prepare(request)?;

        let program = self.executable.display().to_string();
        info!(
            program = %program,
            work_dir = %self.work_dir.display(),
            chains = request.schedule.chains,
            iterations = request.schedule.iterations,
            "running JAGS"
        );
        let output = Command::new(&self.executable)
            .arg(SCRIPT_FILE)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|source| SamplerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut transcript = String::from_utf8_lossy(&output.stdout).into_owned();
        transcript.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() || ERROR_MARKERS.iter().any(|m| transcript.contains(m)) {
            return Err(SamplerError::Failed {
                status: output.status.to_string(),
                output: transcript,
            });
        }
        debug!(bytes = transcript.len(), "JAGS finished");

        let draws = self.read_draws(request)?;
        let result = SamplerOutput {
            draws,
            convergence: None,
        };
        result.ensure_complete(request)?;
        Ok(result)
    }
}

#[must_use]
pub fn inits_file(chain: usize) -> String {
    format!("inits{chain}.R")
}

fn format_number(value: f64) -> String {
    if value.is_finite() {
        format!("{value:?}")
    } else {
        "NA".to_string()
    }
}

fn render_value(value: &DataValue) -> String {
    match value {
        DataValue::Scalar(scalar) => format_number(*scalar),
        DataValue::Vector(values) => {
            let items = values
                .iter()
                .map(|value| value.map_or_else(|| "NA".to_string(), format_number))
                .collect::<Vec<_>>();
            format!("c({})", items.join(", "))
        }
        DataValue::Matrix(matrix) => {
            let mut items = Vec::with_capacity(matrix.nrows() * matrix.ncols());
            for col in 0..matrix.ncols() {
                for row in 0..matrix.nrows() {
                    items.push(format_number(matrix[(row, col)]));
                }
            }
            format!(
                "structure(c({}), .Dim = c({}L, {}L))",
                items.join(", "),
                matrix.nrows(),
                matrix.ncols()
            )
        }
        DataValue::Array { dims, values } => {
            let items = values
                .iter()
                .map(|value| value.map_or_else(|| "NA".to_string(), format_number))
                .collect::<Vec<_>>();
            let dims = dims
                .iter()
                .map(|dim| format!("{dim}L"))
                .collect::<Vec<_>>();
            format!(
                "structure(c({}), .Dim = c({}))",
                items.join(", "),
                dims.join(", ")
            )
        }
    }
}

/// Data in R dump format, one assignment per binding.
#[must_use]
pub fn render_data(data: &DataBindings) -> String {
    data.iter()
        .map(|(name, value)| format!("\"{name}\" <- {}\n", render_value(value)))
        .collect()
}

/// One chain's initial values in R dump format.
#[must_use]
pub fn render_inits(inits: &InitialValues) -> String {
    let mut out = String::new();
    for (name, value) in &inits.values {
        out.push_str(&format!("\"{name}\" <- {}\n", render_value(value)));
    }
    if let Some(rng_name) = &inits.rng_name {
        out.push_str(&format!("\".RNG.name\" <- \"{rng_name}\"\n"));
    }
    if let Some(seed) = inits.rng_seed {
        out.push_str(&format!("\".RNG.seed\" <- {seed}\n"));
    }
    out
}

/// Batch script driving compilation, burn-in, monitoring and CODA output.
#[must_use]
pub fn render_script(request: &SamplerRequest<'_>) -> String {
    let schedule = request.schedule;
    let mut lines = vec![
        format!("model in \"{MODEL_FILE}\""),
        format!("data in \"{DATA_FILE}\""),
        format!("compile, nchains({})", schedule.chains),
    ];
    for chain in 1..=request.inits.len().min(schedule.chains) {
        lines.push(format!("parameters in \"{}\", chain({chain})", inits_file(chain)));
    }
    lines.push("initialize".to_string());
    lines.push(format!("update {}", schedule.burn_in));
    for node in request.monitor {
        lines.push(format!("monitor {}, thin({})", node.name, schedule.thin));
    }
    lines.push(format!("update {}", schedule.sampling_iterations()));
    lines.push(format!("coda *, stem({CODA_STEM})"));
    lines.push("exit".to_string());
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Parse a CODA index file and one chain file per chain.
///
/// # Errors
///
/// Returns `SamplerError::MalformedOutput` for unreadable lines or ranges, and an
/// inference error when a chain holds the wrong number of draws.
pub fn parse_coda(
    index: &str,
    chains: &[String],
    draws_per_chain: usize,
) -> Result<PosteriorDraws, SamplerError> {
    let ranges = parse_index(index)?;
    let chain_values = chains
        .iter()
        .map(|text| parse_chain_values(text))
        .collect::<Result<Vec<_>, _>>()?;

    let mut draws = PosteriorDraws::new(chains.len(), draws_per_chain);
    for (name, (start, end)) in ranges {
        let per_chain = chain_values
            .iter()
            .map(|values| {
                values
                    .get(start - 1..end)
                    .map(<[f64]>::to_vec)
                    .ok_or_else(|| {
                        SamplerError::MalformedOutput(format!(
                            "lines {start}-{end} for `{name}` exceed chain file length {}",
                            values.len()
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        draws.push_element(name, &per_chain)?;
    }
    Ok(draws)
}

fn parse_index(index: &str) -> Result<Vec<(String, (usize, usize))>, SamplerError> {
    let mut ranges = Vec::new();
    for line in index.lines().filter(|line| !line.trim().is_empty()) {
        let mut fields = line.split_whitespace();
        let (Some(name), Some(start), Some(end)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(SamplerError::MalformedOutput(format!(
                "index line `{line}`"
            )));
        };
        let parse = |field: &str| {
            field
                .parse::<usize>()
                .map_err(|_| SamplerError::MalformedOutput(format!("index line `{line}`")))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if start == 0 || end < start {
            return Err(SamplerError::MalformedOutput(format!(
                "index line `{line}`"
            )));
        }
        ranges.push((name.to_string(), (start, end)));
    }
    Ok(ranges)
}

fn parse_chain_values(text: &str) -> Result<Vec<f64>, SamplerError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .nth(1)
                .and_then(|value| value.parse::<f64>().ok())
                .ok_or_else(|| SamplerError::MalformedOutput(format!("chain line `{line}`")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::McmcConfig;
    use crate::inference::sampler::{MonitoredNode, NodeSupport};
    use faer::Mat;

    #[test]
    fn data_is_rendered_in_r_dump_format() {
        let mut data = DataBindings::new();
        data.insert("N1", DataValue::Scalar(3.0));
        data.insert("eff1", DataValue::Vector(vec![Some(0.5), None, Some(0.25)]));
        data.insert(
            "X1_e",
            DataValue::Matrix(Mat::from_fn(2, 2, |i, j| match (i, j) {
                (_, 0) => 1.0,
                (0, _) => 10.0,
                _ => 11.0,
            })),
        );
        let text = render_data(&data);
        assert!(text.contains("\"N1\" <- 3.0"));
        assert!(text.contains("\"eff1\" <- c(0.5, NA, 0.25)"));
        assert!(text.contains("\"X1_e\" <- structure(c(1.0, 1.0, 10.0, 11.0), .Dim = c(2L, 2L))"));
    }

    #[test]
    fn inits_carry_rng_stream() {
        let inits = InitialValues::new()
            .with_scalar("beta0", 0.1)
            .with_rng(DEFAULT_RNG, 17);
        let text = render_inits(&inits);
        assert!(text.contains("\"beta0\" <- 0.1"));
        assert!(text.contains("\".RNG.name\" <- \"base::Mersenne-Twister\""));
        assert!(text.contains("\".RNG.seed\" <- 17"));
    }

    #[test]
    fn script_runs_burn_in_before_monitoring() {
        let data = DataBindings::new();
        let inits = vec![InitialValues::new(), InitialValues::new()];
        let monitor = vec![MonitoredNode::vector("mu.e", 2, NodeSupport::Real)];
        let request = SamplerRequest {
            model: "model {}",
            data: &data,
            inits: &inits,
            monitor: &monitor,
            schedule: McmcConfig::default().with_thin(2),
        };
        let script = render_script(&request);
        let lines = script.lines().collect::<Vec<_>>();
        assert_eq!(lines[2], "compile, nchains(2)");
        assert_eq!(lines[3], "parameters in \"inits1.R\", chain(1)");
        assert_eq!(lines[6], "update 1000");
        assert_eq!(lines[7], "monitor mu.e, thin(2)");
        assert_eq!(lines[8], "update 1000");
        assert_eq!(lines[9], "coda *, stem(CODA)");
    }

    #[test]
    fn coda_output_is_parsed_per_chain() {
        let index = "mu.e[1] 1 3\nmu.e[2] 4 6\n";
        let chain = |offset: f64| {
            (1..=6)
                .map(|i| format!("{} {}", i, f64::from(i) + offset))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let draws = parse_coda(index, &[chain(0.0), chain(100.0)], 3).unwrap();
        assert_eq!(draws.chain("mu.e[2]", 0).unwrap(), &[4.0, 5.0, 6.0]);
        assert_eq!(draws.chain("mu.e[1]", 1).unwrap(), &[101.0, 102.0, 103.0]);
        assert_eq!(draws.names().len(), 2);
    }

    #[test]
    fn thinned_schedules_accept_a_partial_final_stride() {
        let schedule = McmcConfig::default().with_thin(3);
        let draws = schedule.retained_draws();
        let index = format!("mu.e[1] 1 {draws}\nmu.e[2] {} {}\n", draws + 1, 2 * draws);
        let chain = (1..=2 * draws)
            .map(|i| format!("{i} {}", crate::utils::usize_to_f64(i)))
            .collect::<Vec<_>>()
            .join("\n");

        let parsed = parse_coda(&index, &[chain.clone(), chain], draws).unwrap();

        assert_eq!(draws, 334);
        assert_eq!(parsed.draws_per_chain(), 334);
        assert_eq!(parsed.chain("mu.e[2]", 1).unwrap()[0], 335.0);
    }

    #[test]
    fn coda_rejects_short_chain_file() {
        let err = parse_coda("x 1 5\n", &["1 0.1\n2 0.2".to_string()], 5).unwrap_err();
        assert!(matches!(err, SamplerError::MalformedOutput(_)));
    }

    #[test]
    fn coda_rejects_draw_count_mismatch() {
        let err = parse_coda("x 1 2\n", &["1 0.1\n2 0.2".to_string()], 3).unwrap_err();
        assert!(matches!(err, SamplerError::Inference(_)));
    }
}
