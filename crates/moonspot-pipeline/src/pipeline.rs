//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! [`crate::detect`] runs everything in one call. [`Pipeline`] lets the
//! caller drive execution one step at a time:
//!
//! ```rust
//! # use moonspot_pipeline::{DetectConfig, DetectError, Pipeline};
//! # use image::{DynamicImage, RgbImage};
//! # fn run() -> Result<(), DetectError> {
//! let image = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
//! let grayscale = Pipeline::new(&image, DetectConfig::default())
//!     .ingest()?
//!     .grayscale();
//!
//! let detection = match grayscale.locate() {
//!     Ok(located) => located.annotate().into_detection(),
//!     Err(missed) => missed.into_detection(),
//! };
//! assert_eq!(detection.image.width(), 64);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying the borrowed input, the configuration and the stage log.
//! [`Grayscale::locate`] is the only branch point: it either continues to
//! [`Located`] or stops at [`Missed`], whose output is the input
//! unchanged.

use image::{DynamicImage, GrayImage, RgbImage};
use web_time::Instant;

use crate::diagnostics::{PipelineDiagnostics, StageLog, StageMetrics};
use crate::locate::DiskLocator;
use crate::types::{DetectConfig, DetectError, Detection, Dimensions, DiskFit, Miss, Outcome};

/// Entry point of the incremental pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Start a run over `image`. Nothing is computed yet.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(image: &DynamicImage, config: DetectConfig) -> Pending<'_> {
        Pending {
            image,
            config,
            started: Instant::now(),
        }
    }
}

/// State carried through every stage.
struct Run<'a> {
    image: &'a DynamicImage,
    config: DetectConfig,
    dimensions: Dimensions,
    started: Instant,
    log: StageLog,
}

impl Run<'_> {
    fn finish(self, output: DynamicImage, outcome: Outcome) -> (Detection, PipelineDiagnostics) {
        let diagnostics = PipelineDiagnostics {
            dimensions: self.dimensions,
            stages: self.log.into_stages(),
            total_duration: self.started.elapsed(),
            outcome: outcome.clone(),
        };
        let detection = Detection {
            image: output,
            outcome,
            dimensions: self.dimensions,
        };
        (detection, diagnostics)
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`ingest`](Self::ingest) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .ingest() to continue"]
pub struct Pending<'a> {
    image: &'a DynamicImage,
    config: DetectConfig,
    started: Instant,
}

impl<'a> Pending<'a> {
    /// The caller's input image.
    #[must_use]
    pub const fn source(&self) -> &DynamicImage {
        self.image
    }

    /// Validate the input and build the normalized RGB working copy.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::InvalidInput`] for a zero-area image.
    pub fn ingest(self) -> Result<Ingested<'a>, DetectError> {
        let start = Instant::now();
        let dimensions = crate::ingest::validate(self.image)?;
        let rgb = crate::ingest::normalize(self.image)?;

        let mut log = StageLog::new();
        log.record(
            "Ingest",
            start,
            StageMetrics::Ingest {
                width: dimensions.width,
                height: dimensions.height,
                color_type: format!("{:?}", self.image.color()),
                had_alpha: self.image.color().has_alpha(),
            },
        );

        Ok(Ingested {
            run: Run {
                image: self.image,
                config: self.config,
                dimensions,
                started: self.started,
                log,
            },
            rgb,
        })
    }
}

// ───────────────────────── Stage 1: Ingested ─────────────────────────

/// Pipeline state after validation and normalization.
///
/// Call [`grayscale`](Self::grayscale) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .grayscale() to continue"]
pub struct Ingested<'a> {
    run: Run<'a>,
    rgb: RgbImage,
}

impl<'a> Ingested<'a> {
    /// The 8-bit RGB working copy.
    #[must_use]
    pub const fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// Input dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.run.dimensions
    }

    /// Reduce the working copy to luminance.
    pub fn grayscale(self) -> Grayscale<'a> {
        let mut run = self.run;
        let start = Instant::now();
        let gray = crate::grayscale::luminance(&self.rgb);
        run.log.record(
            "Grayscale",
            start,
            StageMetrics::Grayscale {
                mean_intensity: crate::grayscale::mean_intensity(&gray),
            },
        );
        Grayscale { run, gray }
    }
}

// ───────────────────────── Stage 2: Grayscale ────────────────────────

/// Pipeline state after luminance conversion.
///
/// Call [`locate`](Self::locate) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .locate() to continue"]
pub struct Grayscale<'a> {
    run: Run<'a>,
    gray: GrayImage,
}

impl<'a> Grayscale<'a> {
    /// The luminance image.
    #[must_use]
    pub const fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Run the configured [`DiskLocator`].
    ///
    /// # Errors
    ///
    /// Returns [`Missed`] when no plausible disk is found. This is a
    /// normal terminal state; its output is the input unchanged.
    pub fn locate(self) -> Result<Located<'a>, Missed<'a>> {
        let mut run = self.run;
        let detector = run.config.detector;
        match detector.locate(&self.gray, &run.config, &mut run.log) {
            Ok(fit) => {
                log::debug!(
                    "located disk at ({:.1}, {:.1}) r={:.1} via {detector}",
                    fit.circle.center.x,
                    fit.circle.center.y,
                    fit.circle.radius
                );
                Ok(Located { run, fit })
            }
            Err(miss) => {
                log::debug!("no disk via {detector}: {miss}");
                Err(Missed { run, miss })
            }
        }
    }
}

// ───────────────────────── Stage 3: Located ──────────────────────────

/// Pipeline state after a disk was found.
///
/// Call [`annotate`](Self::annotate) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .annotate() to continue"]
pub struct Located<'a> {
    run: Run<'a>,
    fit: DiskFit,
}

impl<'a> Located<'a> {
    /// The fitted disk.
    #[must_use]
    pub const fn fit(&self) -> &DiskFit {
        &self.fit
    }

    /// Draw the overlay, or crop, according to the configured output mode.
    pub fn annotate(self) -> Annotated<'a> {
        let mut run = self.run;
        let start = Instant::now();
        let output = crate::annotate::render(run.image, &self.fit.circle, &run.config);
        run.log.record(
            "Annotate",
            start,
            StageMetrics::Annotate {
                mode: run.config.output_mode,
                width: output.width(),
                height: output.height(),
            },
        );
        Annotated {
            run,
            fit: self.fit,
            output,
        }
    }
}

// ───────────────────────── Stage 4: Annotated ────────────────────────

/// Terminal state with an annotated output image.
#[must_use = "call .into_detection() or .into_parts() to take the result"]
pub struct Annotated<'a> {
    run: Run<'a>,
    fit: DiskFit,
    output: DynamicImage,
}

impl Annotated<'_> {
    /// The annotated output image.
    #[must_use]
    pub const fn output(&self) -> &DynamicImage {
        &self.output
    }

    /// The fitted disk.
    #[must_use]
    pub const fn fit(&self) -> &DiskFit {
        &self.fit
    }

    /// Take the result, discarding diagnostics.
    #[must_use]
    pub fn into_detection(self) -> Detection {
        self.into_parts().0
    }

    /// Take the result together with the run's diagnostics.
    #[must_use]
    pub fn into_parts(self) -> (Detection, PipelineDiagnostics) {
        self.run.finish(self.output, Outcome::Found(self.fit))
    }
}

// ───────────────────────── Terminal: Missed ──────────────────────────

/// Terminal state when no disk was found.
///
/// The output is a pixel-identical copy of the input.
#[must_use = "call .into_detection() or .into_parts() to take the result"]
pub struct Missed<'a> {
    run: Run<'a>,
    miss: Miss,
}

impl Missed<'_> {
    /// Why detection stopped.
    #[must_use]
    pub const fn miss(&self) -> Miss {
        self.miss
    }

    /// Take the pass-through result, discarding diagnostics.
    #[must_use]
    pub fn into_detection(self) -> Detection {
        self.into_parts().0
    }

    /// Take the pass-through result together with the run's diagnostics.
    #[must_use]
    pub fn into_parts(self) -> (Detection, PipelineDiagnostics) {
        let output = self.run.image.clone();
        self.run.finish(output, Outcome::Missed(self.miss))
    }
}
