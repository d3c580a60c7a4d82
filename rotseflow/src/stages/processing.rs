//! Built-in processing stages.
//!
//! Every stage here delegates the reduction work to a collaborator: file
//! discovery to a [`DataFinder`], everything else to an external program
//! through a [`ToolRunner`]. Programs are configurable with the `program`
//! keyword argument and extra arguments can be appended with `args`.

use super::{ProcessingStage, StageInit};
use crate::config::{Nights, StageArgs};
use crate::core::{Capability, StageData};
use crate::errors::{ConfigurationError, ExecutionError, ParameterError, ReferenceError, RotseflowError};
use crate::external::{DataFinder, DataQuery, ImageInspector, ToolInvocation, ToolOutput, ToolRunner};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The only program `Find_Data` knows how to search for.
pub const SUPERNOVA_PROGRAM: &str = "supernova";

/// Wraps one external program for a stage.
#[derive(Clone)]
struct Tool {
    runner: Arc<dyn ToolRunner>,
    default_program: &'static str,
}

impl Tool {
    fn from_init(init: &StageInit<'_>, default_program: &'static str) -> Result<Self, ConfigurationError> {
        let runner = init.services.tool_runner.clone().ok_or_else(|| {
            ConfigurationError::new(format!("{} needs a tool runner", init.name)).with_stage(init.name)
        })?;
        Ok(Self {
            runner,
            default_program,
        })
    }

    fn invocation(&self, args: &StageArgs) -> ToolInvocation {
        ToolInvocation::new(args.get_str("program").unwrap_or(self.default_program))
    }

    async fn run(&self, stage: &str, invocation: ToolInvocation, args: &StageArgs) -> Result<ToolOutput, RotseflowError> {
        let mut invocation = invocation;
        invocation
            .args
            .extend(args.get_string_list("args").unwrap_or_default());

        info!(stage, command = %invocation, "Running tool");
        let output = self.runner.run(&invocation).await?;
        if !output.succeeded() {
            let status = output
                .exit_code
                .map_or_else(|| "signal".to_string(), |code| code.to_string());
            return Err(ExecutionError::new(
                stage,
                format!("{} exited with status {status}: {}", invocation.program, output.stderr.trim()),
            )
            .into());
        }
        Ok(output)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("default_program", &self.default_program)
            .finish_non_exhaustive()
    }
}

async fn stage_dir(args: &StageArgs, stage: &str, sub: &str) -> Result<PathBuf, RotseflowError> {
    let dir = args.require_path(stage, "outdir")?.join(sub);
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

fn path_args(paths: &[PathBuf]) -> impl Iterator<Item = String> + '_ {
    paths.iter().map(|p| p.display().to_string())
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

fn require_coordinate(args: &StageArgs, stage: &str, key: &str) -> Result<f64, ParameterError> {
    args.get_f64(key).ok_or_else(|| ParameterError::missing(stage, key))
}

fn field_of(args: &StageArgs, input: &StageData) -> Option<String> {
    args.get_str("Field")
        .or_else(|| input.attribute("field").and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

/// Drops images whose exposure has no matching `_cobj.fit` catalog.
///
/// Image files are named `<night>_<field>_<telescope><expnum>...`, and the
/// catalog for an exposure is `<night>_<field>_<telescope><expnum>_cobj.fit`.
/// Returns the kept images and the dropped ones.
#[must_use]
pub fn match_image_prods(
    images: &[PathBuf],
    prods: &[PathBuf],
    telescope: &str,
    field: &str,
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let catalogs: HashSet<&str> = prods
        .iter()
        .map(|p| file_name(p))
        .filter(|name| name.contains("cobj"))
        .collect();

    images.iter().cloned().partition(|image| {
        let name = file_name(image);
        let Some(night) = name.get(..6) else {
            return false;
        };
        let prefix = format!("{night}_{field}_{telescope}");
        name.strip_prefix(&prefix)
            .and_then(|rest| rest.get(..3))
            .is_some_and(|expnum| catalogs.contains(format!("{prefix}{expnum}_cobj.fit").as_str()))
    })
}

/// Picks the template among subimages named `YYMMDD...`.
///
/// The earliest image is the template when the first two images fall in
/// different years and the first was not taken on December 31st; otherwise
/// the latest image is.
#[must_use]
pub fn choose_template(images: &[PathBuf]) -> Option<PathBuf> {
    let mut sorted: Vec<&PathBuf> = images.iter().collect();
    sorted.sort_by(|a, b| file_name(a).cmp(file_name(b)));

    match sorted.as_slice() {
        [] => None,
        [first, second, ..] => {
            let (first_name, second_name) = (file_name(first), file_name(second));
            let years_differ = first_name.get(..2) != second_name.get(..2);
            let new_years_eve = first_name.get(2..6) == Some("1231");
            if years_differ && !new_years_eve {
                Some((*first).clone())
            } else {
                sorted.last().map(|p| (*p).clone())
            }
        }
        [only] => Some((*only).clone()),
    }
}

async fn copy_into(dir: &Path, files: &[PathBuf]) -> Result<Vec<PathBuf>, RotseflowError> {
    tokio::fs::create_dir_all(dir).await?;
    let mut copied = Vec::with_capacity(files.len());
    for file in files {
        let target = dir.join(file_name(file));
        tokio::fs::copy(file, &target).await?;
        copied.push(target);
    }
    Ok(copied)
}

/// Finds preprocessed images and catalogs for the run.
pub struct FindData {
    name: String,
    finder: Arc<dyn DataFinder>,
}

impl FindData {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no data finder is available.
    pub fn new(init: &StageInit<'_>) -> Result<Self, ConfigurationError> {
        let finder = init.services.data_finder.clone().ok_or_else(|| {
            ConfigurationError::new(format!("{} needs a data finder", init.name)).with_stage(init.name)
        })?;
        Ok(Self {
            name: init.name.to_string(),
            finder,
        })
    }

    fn query(&self, args: &StageArgs) -> Result<DataQuery, ParameterError> {
        let nights = args
            .get("Night")
            .and_then(Nights::from_value)
            .ok_or_else(|| ParameterError::missing(&self.name, "Night"))?;
        let telescope = args.require_string(&self.name, "Telescope")?;
        let program = args.get_str("Program").unwrap_or(SUPERNOVA_PROGRAM).to_string();
        if program != SUPERNOVA_PROGRAM {
            return Err(ParameterError::new(format!("Program {program} is not valid, can't find data")));
        }

        let field = args.get_str("Field").map(str::to_string);
        let (ra, dec) = (args.get_f64("RA"), args.get_f64("DEC"));
        if field.is_none() && (ra.is_none() || dec.is_none()) {
            return Err(ParameterError::new("Must provide either the supernova field or coordinates"));
        }

        Ok(DataQuery {
            nights,
            telescope,
            field,
            ra,
            dec,
            program,
            datadir: args.get_path("datadir"),
        })
    }
}

impl fmt::Debug for FindData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindData").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl ProcessingStage for FindData {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        Capability::Request
    }

    fn output_capability(&self) -> Capability {
        Capability::Images
    }

    async fn run(&self, _input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        let query = self.query(args)?;
        info!(
            stage = %self.name,
            first = %query.nights.first,
            last = %query.nights.last,
            "Finding supernova data"
        );

        let found = self.finder.find(&query).await?;
        let field = found
            .field
            .clone()
            .or_else(|| query.field.clone())
            .ok_or_else(|| ReferenceError::new("No supernova fields contain data for these coordinates"))?;

        let (mut images, dropped) = match_image_prods(&found.images, &found.prods, &query.telescope, &field);
        info!(stage = %self.name, dropped = dropped.len(), "Removing images without prod files");
        if images.is_empty() {
            return Err(ReferenceError::new(format!("No images with prod files found for {field}")).into());
        }
        let mut prods = found.prods;

        if let Some(outdir) = args.get_path("outdir") {
            let preproc = outdir.join("preproc");
            info!(stage = %self.name, dir = %preproc.display(), "Copying preprocessed files");
            images = copy_into(&preproc.join("image"), &images).await?;
            prods = copy_into(&preproc.join("prod"), &prods).await?;
        }

        let count = images.len();
        Ok(StageData::new(Capability::Images)
            .with_images(images)
            .with_products(prods)
            .with_attribute("field", field.into())
            .with_attribute("telescope", query.telescope.into())
            .with_attribute("nights", query.nights.to_value())
            .with_metric("NIMAGES", count.into()))
    }
}

/// Coadds the preprocessed images of each night.
#[derive(Debug)]
pub struct Coaddition {
    name: String,
    tool: Tool,
}

impl Coaddition {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no tool runner is available.
    pub fn new(init: &StageInit<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: init.name.to_string(),
            tool: Tool::from_init(init, "coadd_all")?,
        })
    }
}

#[async_trait]
impl ProcessingStage for Coaddition {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        Capability::Images
    }

    fn output_capability(&self) -> Capability {
        Capability::Coadds
    }

    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        let dir = stage_dir(args, &self.name, "coadd").await?;
        let invocation = self
            .tool
            .invocation(args)
            .in_dir(&dir)
            .output(args.get_str("pattern").unwrap_or("*_c.fit"));
        let invocation = path_args(&input.images).fold(invocation, ToolInvocation::arg);

        let output = self.tool.run(&self.name, invocation, args).await?;
        if output.outputs.is_empty() {
            return Err(ExecutionError::new(&self.name, "no coadded images were produced").into());
        }

        let count = output.outputs.len();
        Ok(input
            .clone()
            .into_capability(Capability::Coadds)
            .with_images(output.outputs)
            .with_products(Vec::<PathBuf>::new())
            .with_metric("NCOADD", count.into()))
    }
}

/// Extracts source catalogs from coadded images.
pub struct SourceExtraction {
    name: String,
    tool: Tool,
    inspector: Option<Arc<dyn ImageInspector>>,
}

impl fmt::Debug for SourceExtraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceExtraction")
            .field("name", &self.name)
            .field("tool", &self.tool)
            .field("inspector", &self.inspector.is_some())
            .finish()
    }
}

impl SourceExtraction {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no tool runner is available.
    pub fn new(init: &StageInit<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: init.name.to_string(),
            tool: Tool::from_init(init, "sex")?,
            inspector: init.services.image_inspector.clone(),
        })
    }

    fn saturation_level(&self, image: &Path) -> Option<String> {
        let inspector = self.inspector.as_ref()?;
        match inspector.header(image) {
            Ok(header) => header.get("SATCNTS").map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            Err(e) => {
                warn!(stage = %self.name, image = %image.display(), error = %e, "Can't read header");
                None
            }
        }
    }
}

#[async_trait]
impl ProcessingStage for SourceExtraction {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        Capability::Coadds
    }

    fn output_capability(&self) -> Capability {
        Capability::Catalogs
    }

    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        let prod_dir = stage_dir(args, &self.name, "coadd/prod").await?;

        let mut catalogs = Vec::with_capacity(input.images.len());
        for image in &input.images {
            let root = file_name(image).trim_end_matches(".fit").trim_end_matches("_c");
            let catalog_name = format!("{root}_sobj.fit");

            let mut invocation = self
                .tool
                .invocation(args)
                .arg(image.display().to_string())
                .arg("-CATALOG_NAME")
                .arg(prod_dir.join(&catalog_name).display().to_string())
                .in_dir(&prod_dir)
                .output(catalog_name.as_str());
            if let Some(level) = self.saturation_level(image) {
                invocation = invocation.arg("-SATUR_LEVEL").arg(level);
            }

            let output = self.tool.run(&self.name, invocation, args).await?;
            if output.outputs.is_empty() {
                return Err(ExecutionError::new(&self.name, format!("no catalog written for {}", image.display())).into());
            }
            catalogs.extend(output.outputs);
        }

        let count = catalogs.len();
        Ok(input
            .clone()
            .into_capability(Capability::Catalogs)
            .with_products(catalogs)
            .with_metric("NCATALOG", count.into()))
    }
}

/// Cuts subimages centred on the target.
#[derive(Debug)]
pub struct MakeSubimages {
    name: String,
    tool: Tool,
}

impl MakeSubimages {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no tool runner is available.
    pub fn new(init: &StageInit<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: init.name.to_string(),
            tool: Tool::from_init(init, "make_rotse3_subimage")?,
        })
    }

    /// Locates the reference image and catalog for `field`.
    fn find_template(tempdir: &Path, telescope: &str, field: &str) -> Result<(PathBuf, PathBuf), RotseflowError> {
        let reference = tempdir.join(telescope).join("reference");
        let first_match = |sub: &str| -> Result<Option<PathBuf>, RotseflowError> {
            let pattern = reference.join(sub).join(format!("*{field}*"));
            let mut matches = glob::glob(&pattern.to_string_lossy())
                .map_err(|e| anyhow::anyhow!("Invalid template pattern: {e}"))?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            matches.sort();
            Ok(matches.into_iter().next())
        };

        match (first_match("image")?, first_match("prod")?) {
            (Some(image), Some(prod)) => Ok((image, prod)),
            _ => Err(ReferenceError::new(format!("No reference image for {field}")).into()),
        }
    }
}

#[async_trait]
impl ProcessingStage for MakeSubimages {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        Capability::Catalogs
    }

    fn output_capability(&self) -> Capability {
        Capability::Subimages
    }

    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        let ra = require_coordinate(args, &self.name, "RA")?;
        let dec = require_coordinate(args, &self.name, "DEC")?;
        let dir = stage_dir(args, &self.name, "sub").await?;

        let mut images = input.images.clone();
        let mut prods = input.products.clone();
        if args.get_str("Program") == Some(SUPERNOVA_PROGRAM) {
            if let Some(tempdir) = args.get_path("tempdir") {
                let telescope = args.require_string(&self.name, "Telescope")?;
                let field = field_of(args, input).ok_or_else(|| ParameterError::missing(&self.name, "Field"))?;
                let (image, prod) = Self::find_template(&tempdir, &telescope, &field)?;
                info!(stage = %self.name, template = %image.display(), "Found reference image");
                images.push(image);
                prods.push(prod);
            }
        }

        let image_pattern = args.get_str("pattern").unwrap_or("*_c.fit").to_string();
        let mut invocation = path_args(&images)
            .fold(self.tool.invocation(args), ToolInvocation::arg)
            .arg(format!("racent={ra}"))
            .arg(format!("deccent={dec}"));
        if let Some(radius) = args.get_f64("PixelRadius") {
            invocation = invocation.arg(format!("pixrad={radius}"));
        }
        let invocation = invocation
            .in_dir(&dir)
            .output(image_pattern.as_str())
            .output("*_cobj.fit");

        let output = self.tool.run(&self.name, invocation, args).await?;
        let (subimages, catalogs): (Vec<PathBuf>, Vec<PathBuf>) = output
            .outputs
            .into_iter()
            .partition(|p| !file_name(p).ends_with("_cobj.fit"));
        if subimages.is_empty() {
            return Err(ExecutionError::new(&self.name, "no subimages were produced").into());
        }
        debug!(stage = %self.name, subimages = subimages.len(), catalogs = catalogs.len(), "Subimages made");

        Ok(input
            .clone()
            .into_capability(Capability::Subimages)
            .with_images(subimages)
            .with_products(catalogs)
            .with_attribute("ra", ra.into())
            .with_attribute("dec", dec.into()))
    }
}

/// Subtracts the template from every subimage.
#[derive(Debug)]
pub struct ImageDifferencing {
    name: String,
    tool: Tool,
}

impl ImageDifferencing {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no tool runner is available.
    pub fn new(init: &StageInit<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: init.name.to_string(),
            tool: Tool::from_init(init, "difference_all.py")?,
        })
    }
}

#[async_trait]
impl ProcessingStage for ImageDifferencing {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        Capability::Subimages
    }

    fn output_capability(&self) -> Capability {
        Capability::Differences
    }

    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        let dir = stage_dir(args, &self.name, "sub").await?;
        let invocation = path_args(&input.images)
            .fold(self.tool.invocation(args).arg("-i"), ToolInvocation::arg)
            .in_dir(&dir)
            .output(args.get_str("pattern").unwrap_or("*_sub.fit"));

        let output = self.tool.run(&self.name, invocation, args).await?;
        if output.outputs.is_empty() {
            return Err(ExecutionError::new(&self.name, "no difference images were produced").into());
        }

        let count = output.outputs.len();
        Ok(input
            .clone()
            .into_capability(Capability::Differences)
            .with_images(output.outputs)
            .with_metric("NDIFF", count.into()))
    }
}

/// Chooses reference stars on the template image.
#[derive(Debug)]
pub struct ChooseRefstars {
    name: String,
    tool: Tool,
}

impl ChooseRefstars {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no tool runner is available.
    pub fn new(init: &StageInit<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: init.name.to_string(),
            tool: Tool::from_init(init, "rphot")?,
        })
    }
}

#[async_trait]
impl ProcessingStage for ChooseRefstars {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        Capability::Differences
    }

    fn output_capability(&self) -> Capability {
        Capability::Differences
    }

    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        let ra = require_coordinate(args, &self.name, "RA")?;
        let dec = require_coordinate(args, &self.name, "DEC")?;
        let template = choose_template(&input.images)
            .ok_or_else(|| ReferenceError::new("No subimages to choose a template from"))?;
        info!(stage = %self.name, template = %template.display(), "Choosing reference stars");

        let dir = stage_dir(args, &self.name, "sub").await?;
        let invocation = self
            .tool
            .invocation(args)
            .arg(template.display().to_string())
            .arg(format!("targetra={ra}"))
            .arg(format!("targetdec={dec}"))
            .in_dir(&dir)
            .output(args.get_str("pattern").unwrap_or("*refstars*"));

        let output = self.tool.run(&self.name, invocation, args).await?;

        let mut data = input.clone().into_capability(Capability::Differences);
        data.products.extend(output.outputs);
        Ok(data.with_attribute("template", template.display().to_string().into()))
    }
}

/// A light curve as written by the photometry program.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightCurve {
    /// Modified Julian dates.
    pub mjd: Vec<f64>,
    /// Magnitudes.
    pub mag: Vec<f64>,
    /// Magnitude errors.
    pub magerr: Vec<f64>,
}

impl LightCurve {
    /// Parses a whitespace-separated table.
    ///
    /// Columns are `mjd, _, mag, mag - magerr, ...`; blank lines and `#`
    /// comments are skipped.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first malformed line.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut curve = Self::default();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let columns = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("line {}: {e}", number + 1))?;
            let [mjd, _, mag, lower, ..] = columns.as_slice() else {
                return Err(format!("line {}: expected at least 4 columns", number + 1));
            };
            curve.mjd.push(*mjd);
            curve.mag.push(*mag);
            curve.magerr.push(mag - lower);
        }
        Ok(curve)
    }

    /// Signal-to-noise of each fit, zero where no fit was made.
    #[must_use]
    pub fn fit_snr(&self) -> Vec<f64> {
        let factor = 2.5 / std::f64::consts::LN_10;
        self.magerr
            .iter()
            .map(|err| if err.is_finite() && *err > 0.0 { factor / err } else { 0.0 })
            .collect()
    }
}

/// Measures the target's light curve on the difference images.
#[derive(Debug)]
pub struct Photometry {
    name: String,
    tool: Tool,
}

impl Photometry {
    /// Creates the stage.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if no tool runner is available.
    pub fn new(init: &StageInit<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: init.name.to_string(),
            tool: Tool::from_init(init, "run_phot")?,
        })
    }
}

#[async_trait]
impl ProcessingStage for Photometry {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_capability(&self) -> Capability {
        Capability::Differences
    }

    fn output_capability(&self) -> Capability {
        Capability::LightCurve
    }

    async fn run(&self, input: &StageData, args: &StageArgs) -> Result<StageData, RotseflowError> {
        let dir = stage_dir(args, &self.name, "sub").await?;
        let invocation = path_args(&input.images)
            .fold(self.tool.invocation(args), ToolInvocation::arg)
            .in_dir(&dir)
            .output(args.get_str("pattern").unwrap_or("lightcurve*.dat"));

        let output = self.tool.run(&self.name, invocation, args).await?;
        let Some(table) = output.outputs.first() else {
            return Err(ExecutionError::new(&self.name, "no light curve was written").into());
        };

        let text = tokio::fs::read_to_string(table).await?;
        let curve = LightCurve::parse(&text).map_err(|e| ExecutionError::new(&self.name, e))?;
        info!(stage = %self.name, epochs = curve.mjd.len(), "Light curve measured");

        if let Some(dumpfile) = args.get_path("dumpfile") {
            tokio::fs::write(&dumpfile, serde_json::to_string_pretty(&curve)?).await?;
            debug!(stage = %self.name, path = %dumpfile.display(), "Wrote light curve");
        }

        Ok(input
            .clone()
            .into_capability(Capability::LightCurve)
            .with_images(Vec::<PathBuf>::new())
            .with_products(output.outputs.clone())
            .with_attribute("mjd", serde_json::json!(curve.mjd))
            .with_attribute("mag", serde_json::json!(curve.mag))
            .with_attribute("magerr", serde_json::json!(curve.magerr))
            .with_attribute("fit_snr", serde_json::json!(curve.fit_snr())))
    }
}
