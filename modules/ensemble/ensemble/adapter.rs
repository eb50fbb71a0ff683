use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use ndarray::{Array2, Array3, ArrayD, Ix2, Ix3};
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_logging::LogLevel;
use uuid::Uuid;

use super::{
    func::{probabilities_to_logits, stack_members, sum_members, uniform_weights},
    reviewer::MemberReviewer,
};
use crate::{
    classifier::{Classifier, ClipValues, LayerRef, Preprocessing},
    config::EnsembleConfig,
    error::{ClassifierError, Result},
    generator::DataGenerator,
    telemetry::EnsembleTelemetry,
};

/// A classifier participating in an ensemble.
#[derive(Clone)]
pub struct EnsembleMember {
    /// Identifier used in telemetry.
    pub id: Uuid,
    /// Scalar applied to every output of the member.
    pub weight: f32,
    /// Shared handle to the trained classifier.
    pub classifier: Arc<dyn Classifier>,
}

impl fmt::Debug for EnsembleMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleMember")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("num_classes", &self.classifier.num_classes())
            .finish_non_exhaustive()
    }
}

/// Weighted-average ensemble of pre-trained classifiers.
///
/// Member predictions are combined in probability space, since logits are not
/// comparable between models; logit requests are answered by converting the
/// aggregated probabilities back. The `*_raw` methods skip aggregation and
/// return the weighted per-member outputs stacked along a leading member axis.
/// Training, persistence and layer introspection are not supported.
pub struct EnsembleClassifier {
    members: Vec<EnsembleMember>,
    clip_values: ClipValues,
    input_shape: Vec<usize>,
    num_classes: usize,
    preprocessing: Preprocessing,
    channel_index: usize,
    propagate_learning_phase: bool,
    learning_phase: Mutex<Option<bool>>,
    telemetry: Option<EnsembleTelemetry>,
}

impl fmt::Debug for EnsembleClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleClassifier")
            .field("members", &self.members)
            .field("clip_values", &self.clip_values)
            .field("input_shape", &self.input_shape)
            .field("num_classes", &self.num_classes)
            .field("learning_phase", &*self.learning_phase.lock())
            .finish_non_exhaustive()
    }
}

impl EnsembleClassifier {
    /// Creates an ensemble; `weights` defaults to `1 / classifiers.len()` each.
    pub fn new(
        clip_values: ClipValues,
        classifiers: Vec<Arc<dyn Classifier>>,
        weights: Option<Vec<f32>>,
        preprocessing: Preprocessing,
    ) -> Result<Self> {
        let config = EnsembleConfig {
            clip_values,
            weights,
            preprocessing,
            ..EnsembleConfig::default()
        };
        Self::from_config(&config, classifiers)
    }

    /// Creates an ensemble from a loaded configuration.
    pub fn from_config(
        config: &EnsembleConfig,
        classifiers: Vec<Arc<dyn Classifier>>,
    ) -> Result<Self> {
        let reviewer = MemberReviewer;
        reviewer.review(config.clip_values, &classifiers)?;
        config.preprocessing.validate()?;

        let weights = config
            .weights
            .clone()
            .unwrap_or_else(|| uniform_weights(classifiers.len()));
        reviewer.review_weights(&weights, classifiers.len())?;

        let input_shape = classifiers[0].input_shape().to_vec();
        let num_classes = classifiers[0].num_classes();
        let members = classifiers
            .into_iter()
            .zip(weights)
            .map(|(classifier, weight)| EnsembleMember {
                id: Uuid::new_v4(),
                weight,
                classifier,
            })
            .collect();

        Ok(Self {
            members,
            clip_values: config.clip_values,
            input_shape,
            num_classes,
            preprocessing: config.preprocessing,
            channel_index: config.channel_index,
            propagate_learning_phase: config.propagate_learning_phase,
            learning_phase: Mutex::new(None),
            telemetry: None,
        })
    }

    /// Attaches telemetry sinks and records the ensemble layout.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EnsembleTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self.log(
            LogLevel::Info,
            "ensemble_ready",
            json!({
                "members": self.members.len(),
                "member_ids": self.members.iter().map(|m| m.id.to_string()).collect::<Vec<_>>(),
                "weights": self.weights(),
                "num_classes": self.num_classes,
                "input_shape": self.input_shape,
            }),
        );
        self
    }

    /// Members in construction order.
    #[must_use]
    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    /// Number of members.
    #[must_use]
    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    /// Member weights in construction order.
    #[must_use]
    pub fn weights(&self) -> Vec<f32> {
        self.members.iter().map(|member| member.weight).collect()
    }

    /// Input normalization recorded at construction.
    #[must_use]
    pub const fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    /// Axis of the colour channels or features.
    #[must_use]
    pub const fn channel_index(&self) -> usize {
        self.channel_index
    }

    /// Weighted per-member predictions shaped `(num_members, batch, num_classes)`.
    ///
    /// Members are queried in logit space when `logits` is set.
    pub fn predict_raw(&self, x: &ArrayD<f32>, logits: bool) -> Result<Array3<f32>> {
        self.trace("ensemble_predict", x, json!({ "logits": logits, "raw": true }));
        let outputs = self.weighted(|member| Ok(member.predict(x, logits)?.into_dyn()))?;
        Ok(stack_members(&outputs)?.into_dimensionality::<Ix3>()?)
    }

    /// Weighted per-member class gradients shaped `(num_members, batch, k, *input_shape)`.
    pub fn class_gradient_raw(
        &self,
        x: &ArrayD<f32>,
        label: Option<usize>,
        logits: bool,
    ) -> Result<ArrayD<f32>> {
        self.trace(
            "ensemble_class_gradient",
            x,
            json!({ "label": label, "logits": logits, "raw": true }),
        );
        let outputs = self.weighted(|member| member.class_gradient(x, label, logits))?;
        stack_members(&outputs)
    }

    /// Weighted per-member loss gradients shaped `(num_members, *x.shape)`.
    pub fn loss_gradient_raw(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<ArrayD<f32>> {
        self.trace("ensemble_loss_gradient", x, json!({ "raw": true }));
        let outputs = self.weighted(|member| member.loss_gradient(x, y))?;
        stack_members(&outputs)
    }

    fn weighted<F>(&self, mut query: F) -> Result<Vec<ArrayD<f32>>>
    where
        F: FnMut(&dyn Classifier) -> Result<ArrayD<f32>>,
    {
        self.members
            .iter()
            .map(|member| -> Result<ArrayD<f32>> {
                Ok(query(member.classifier.as_ref())? * member.weight)
            })
            .collect()
    }

    fn unsupported(&self, operation: &'static str) -> ClassifierError {
        self.log(
            LogLevel::Warn,
            "ensemble_unsupported_operation",
            json!({ "operation": operation }),
        );
        ClassifierError::unsupported(operation)
    }

    fn trace(&self, message: &str, x: &ArrayD<f32>, extra: Value) {
        if self.telemetry.is_none() {
            return;
        }
        let mut metadata = json!({
            "members": self.members.len(),
            "batch": x.shape().first().copied().unwrap_or(0),
        });
        if let (Some(target), Value::Object(fields)) = (metadata.as_object_mut(), extra) {
            target.extend(fields);
        }
        self.log(LogLevel::Debug, message, metadata);
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.log(level, message, metadata);
        }
    }
}

impl Classifier for EnsembleClassifier {
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn clip_values(&self) -> ClipValues {
        self.clip_values
    }

    fn predict(&self, x: &ArrayD<f32>, logits: bool) -> Result<Array2<f32>> {
        self.trace("ensemble_predict", x, json!({ "logits": logits, "raw": false }));
        // Aggregate only in probability space.
        let outputs = self.weighted(|member| Ok(member.predict(x, false)?.into_dyn()))?;
        let probs = sum_members(outputs)?.into_dimensionality::<Ix2>()?;
        if logits {
            Ok(probabilities_to_logits(&probs))
        } else {
            Ok(probs)
        }
    }

    fn class_gradient(
        &self,
        x: &ArrayD<f32>,
        label: Option<usize>,
        logits: bool,
    ) -> Result<ArrayD<f32>> {
        self.trace(
            "ensemble_class_gradient",
            x,
            json!({ "label": label, "logits": logits, "raw": false }),
        );
        sum_members(self.weighted(|member| member.class_gradient(x, label, logits))?)
    }

    fn loss_gradient(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<ArrayD<f32>> {
        self.trace("ensemble_loss_gradient", x, json!({ "raw": false }));
        sum_members(self.weighted(|member| member.loss_gradient(x, y))?)
    }

    fn set_learning_phase(&self, train: bool) {
        if !self.propagate_learning_phase {
            return;
        }
        for member in &self.members {
            member.classifier.set_learning_phase(train);
        }
        *self.learning_phase.lock() = Some(train);
        self.log(
            LogLevel::Info,
            "ensemble_learning_phase",
            json!({ "train": train, "members": self.members.len() }),
        );
    }

    fn learning_phase(&self) -> Option<bool> {
        *self.learning_phase.lock()
    }

    fn fit(
        &mut self,
        _x: &ArrayD<f32>,
        _y: &Array2<f32>,
        _batch_size: usize,
        _nb_epochs: usize,
    ) -> Result<()> {
        Err(self.unsupported("fit"))
    }

    fn fit_generator(&mut self, _generator: &mut dyn DataGenerator, _nb_epochs: usize) -> Result<()> {
        Err(self.unsupported("fit_generator"))
    }

    fn save(&self, _filename: &str, _dir: Option<&Path>) -> Result<PathBuf> {
        Err(self.unsupported("save"))
    }

    fn layer_names(&self) -> Result<Vec<String>> {
        Err(self.unsupported("layer_names"))
    }

    fn get_activations(&self, _x: &ArrayD<f32>, _layer: LayerRef) -> Result<ArrayD<f32>> {
        Err(self.unsupported("get_activations"))
    }
}
