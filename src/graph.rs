// graph.rs — Pipeline buffers and the stage dependency graph.
//
// Each stage names its kernel, the buffer bound to every input slot, and the
// buffer its output slot writes. The graph is a small DAG with a fixed
// topological order:
//
//   Origin ─▶ Greyscale ─┬─▶ HorizSobel ─┬─▶ CombSobel ─▶ Threshold ─┐
//                        │               │       (hard | fuzzy)      │
//                        └─▶ VertSobel ──┘                           ▼
//   Origin ───────────────────────────────────────────────────────▶ Outline
//
//   HorizSobel ─▶ NormaliseHorizSobel     VertSobel ─▶ NormaliseVertSobel
//
// Validation runs once when the graph is built:
//   - every input is Origin or written by an earlier stage;
//   - nothing writes Origin (the frame source owns it);
//   - every buffer has one writer, except the Threshold buffer, which the two
//     threshold variants share because exactly one of them runs per frame;
//   - both threshold variants are present, and declare identical bindings.

use std::fmt;

use crate::error::EdgeError;
use crate::kernels::{slot, KernelKind};
use crate::threshold::ThresholdMode;

// ---------------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------------

/// The nine pipeline buffers. Seven core buffers plus two auxiliary
/// normalised Sobel buffers used only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferId {
    Origin,
    Greyscale,
    HorizSobel,
    VertSobel,
    CombSobel,
    Threshold,
    Outline,
    HorizSobelNormalised,
    VertSobelNormalised,
}

impl BufferId {
    /// The seven core buffers, in display order.
    pub const CORE: [BufferId; 7] = [
        BufferId::Origin,
        BufferId::Greyscale,
        BufferId::HorizSobel,
        BufferId::VertSobel,
        BufferId::CombSobel,
        BufferId::Threshold,
        BufferId::Outline,
    ];

    pub const AUXILIARY: [BufferId; 2] =
        [BufferId::HorizSobelNormalised, BufferId::VertSobelNormalised];

    pub const ALL: [BufferId; 9] = [
        BufferId::Origin,
        BufferId::Greyscale,
        BufferId::HorizSobel,
        BufferId::VertSobel,
        BufferId::CombSobel,
        BufferId::Threshold,
        BufferId::Outline,
        BufferId::HorizSobelNormalised,
        BufferId::VertSobelNormalised,
    ];

    /// Dense index in `ALL`, for array-backed buffer tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_auxiliary(self) -> bool {
        matches!(self, BufferId::HorizSobelNormalised | BufferId::VertSobelNormalised)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// What a stage contributes to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    /// Runs every frame.
    Core,
    /// Runs only when the frame's threshold mode matches.
    ThresholdVariant(ThresholdMode),
    /// Visualisation only; nothing downstream reads its output.
    Auxiliary,
}

/// One node of the graph: a kernel and its buffer bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub kernel: KernelKind,
    /// `(slot, buffer)` for every input, in the kernel's slot order.
    pub inputs: Vec<(&'static str, BufferId)>,
    /// `(slot, buffer)` written by this stage.
    pub output: (&'static str, BufferId),
    pub role: StageRole,
}

impl StageSpec {
    fn new(
        kernel: KernelKind,
        inputs: &[(&'static str, BufferId)],
        output: BufferId,
        role: StageRole,
    ) -> Self {
        StageSpec {
            kernel,
            inputs: inputs.to_vec(),
            output: (kernel.output_slot(), output),
            role,
        }
    }

    /// All `(slot, buffer)` bindings, inputs first.
    pub fn bindings(&self) -> impl Iterator<Item = (&'static str, BufferId)> + '_ {
        self.inputs.iter().copied().chain(std::iter::once(self.output))
    }

    pub fn reads(&self, buffer: BufferId) -> bool {
        self.inputs.iter().any(|&(_, b)| b == buffer)
    }

    /// Whether this stage dispatches in a frame with the given mode.
    pub fn runs_in(&self, mode: ThresholdMode) -> bool {
        match self.role {
            StageRole::ThresholdVariant(m) => m == mode,
            StageRole::Core | StageRole::Auxiliary => true,
        }
    }
}

// ---------------------------------------------------------------------------
// StageGraph
// ---------------------------------------------------------------------------

/// A validated, topologically ordered list of stages.
#[derive(Debug, Clone)]
pub struct StageGraph {
    stages: Vec<StageSpec>,
}

impl StageGraph {
    /// The edge-detection graph. `with_normalisation` adds the two auxiliary
    /// normalisation stages after the threshold/outline chain.
    pub fn edge_detection(with_normalisation: bool) -> Result<Self, EdgeError> {
        use BufferId as B;
        use KernelKind as K;

        let mut stages = vec![
            StageSpec::new(K::Greyscale, &[(slot::INPUT, B::Origin)], B::Greyscale, StageRole::Core),
            StageSpec::new(K::HorizSobel, &[(slot::GREYSCALE, B::Greyscale)], B::HorizSobel, StageRole::Core),
            StageSpec::new(K::VertSobel, &[(slot::GREYSCALE, B::Greyscale)], B::VertSobel, StageRole::Core),
            StageSpec::new(
                K::CombSobel,
                &[(slot::HORIZ_SOBEL, B::HorizSobel), (slot::VERT_SOBEL, B::VertSobel)],
                B::CombSobel,
                StageRole::Core,
            ),
            StageSpec::new(
                K::Threshold,
                &[(slot::COMB_SOBEL, B::CombSobel)],
                B::Threshold,
                StageRole::ThresholdVariant(ThresholdMode::Hard),
            ),
            StageSpec::new(
                K::ThresholdFuzzy,
                &[(slot::COMB_SOBEL, B::CombSobel)],
                B::Threshold,
                StageRole::ThresholdVariant(ThresholdMode::Fuzzy),
            ),
            StageSpec::new(
                K::Outline,
                &[(slot::INPUT, B::Origin), (slot::THRESHOLD, B::Threshold)],
                B::Outline,
                StageRole::Core,
            ),
        ];
        if with_normalisation {
            stages.push(StageSpec::new(
                K::NormaliseHorizSobel,
                &[(slot::HORIZ_SOBEL, B::HorizSobel)],
                B::HorizSobelNormalised,
                StageRole::Auxiliary,
            ));
            stages.push(StageSpec::new(
                K::NormaliseVertSobel,
                &[(slot::VERT_SOBEL, B::VertSobel)],
                B::VertSobelNormalised,
                StageRole::Auxiliary,
            ));
        }
        Self::from_stages(stages)
    }

    /// Build a graph from an explicit stage list, validating it.
    pub fn from_stages(stages: Vec<StageSpec>) -> Result<Self, EdgeError> {
        let graph = StageGraph { stages };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), EdgeError> {
        let invalid = |msg: String| Err(EdgeError::InvalidGraph(msg));
        let mut written: Vec<(BufferId, StageRole, KernelKind)> = Vec::new();

        for stage in &self.stages {
            let k = stage.kernel;

            // Slot names must match the kernel's declared layout.
            let declared = k.input_slots();
            if stage.inputs.len() != declared.len()
                || stage.inputs.iter().zip(declared).any(|(&(s, _), d)| s != *d)
            {
                return invalid(format!("{k}: input slots do not match the kernel layout"));
            }

            for &(slot, buffer) in &stage.inputs {
                let ready = buffer == BufferId::Origin
                    || written.iter().any(|&(b, _, _)| b == buffer);
                if !ready {
                    return invalid(format!(
                        "{k} reads {buffer} (slot '{slot}') before any stage writes it"
                    ));
                }
            }

            let out = stage.output.1;
            if out == BufferId::Origin {
                return invalid(format!("{k} writes Origin, which only the frame source fills"));
            }
            if stage.reads(out) {
                return invalid(format!("{k} reads and writes {out}"));
            }
            if out.is_auxiliary() != (stage.role == StageRole::Auxiliary) {
                return invalid(format!("{k} writes {out} with role {:?}", stage.role));
            }
            for &(b, role, other) in &written {
                if b != out {
                    continue;
                }
                let exclusive = matches!(
                    (role, stage.role),
                    (StageRole::ThresholdVariant(a), StageRole::ThresholdVariant(c)) if a != c
                );
                if !exclusive {
                    return invalid(format!("{out} is written by both {other} and {k}"));
                }
            }
            written.push((out, stage.role, k));
        }

        // Both threshold variants must exist with the same bindings, so the
        // per-frame choice between them never changes the data flow.
        let variant = |mode| {
            self.stages
                .iter()
                .find(|s| s.role == StageRole::ThresholdVariant(mode))
        };
        match (variant(ThresholdMode::Hard), variant(ThresholdMode::Fuzzy)) {
            (Some(h), Some(f)) => {
                let hb: Vec<_> = h.bindings().collect();
                let fb: Vec<_> = f.bindings().collect();
                if hb != fb {
                    return invalid("threshold variants bind different buffers".to_string());
                }
            }
            (None, None) => {}
            _ => return invalid("only one threshold variant present".to_string()),
        }

        // Auxiliary output must not feed another stage.
        for aux in self.stages.iter().filter(|s| s.role == StageRole::Auxiliary) {
            let out = aux.output.1;
            if let Some(reader) = self.stages.iter().find(|s| s.reads(out)) {
                return invalid(format!(
                    "auxiliary output {out} is consumed by {}",
                    reader.kernel
                ));
            }
        }
        Ok(())
    }

    /// All stages in topological order, including both threshold variants.
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Stages that dispatch in a frame with the given threshold mode.
    pub fn schedule(&self, mode: ThresholdMode) -> impl Iterator<Item = &StageSpec> + '_ {
        self.stages.iter().filter(move |s| s.runs_in(mode))
    }

    /// Every buffer the graph touches, in `BufferId` order.
    pub fn buffers(&self) -> Vec<BufferId> {
        let mut out: Vec<BufferId> = self
            .stages
            .iter()
            .flat_map(|s| s.bindings().map(|(_, b)| b))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn has_normalisation(&self) -> bool {
        self.stages.iter().any(|s| s.role == StageRole::Auxiliary)
    }
}
