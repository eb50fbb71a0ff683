use std::sync::Arc;

use crate::{
    classifier::{Classifier, ClipValues},
    error::{ClassifierError, Result},
};

/// Validates that a set of classifiers can be ensembled together.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemberReviewer;

impl MemberReviewer {
    /// Checks every member against the configured clip values and the first member.
    pub fn review(&self, clip_values: ClipValues, members: &[Arc<dyn Classifier>]) -> Result<()> {
        let Some(reference) = members.first() else {
            return Err(ClassifierError::Configuration(
                "no classifiers provided for the ensemble".into(),
            ));
        };
        for (index, member) in members.iter().enumerate() {
            self.check_conformance(index, member.as_ref())?;

            if member.clip_values() != clip_values {
                return Err(ClassifierError::Configuration(format!(
                    "incompatible clip values between classifiers in the ensemble: found {} and {}",
                    clip_values,
                    member.clip_values()
                )));
            }
            if member.num_classes() != reference.num_classes() {
                return Err(ClassifierError::Configuration(format!(
                    "incompatible output shapes between classifiers in the ensemble: found {} and {}",
                    member.num_classes(),
                    reference.num_classes()
                )));
            }
            if member.input_shape() != reference.input_shape() {
                return Err(ClassifierError::Configuration(format!(
                    "incompatible input shapes between classifiers in the ensemble: found {:?} and {:?}",
                    member.input_shape(),
                    reference.input_shape()
                )));
            }
        }
        Ok(())
    }

    /// Checks that there is one finite weight per member.
    pub fn review_weights(&self, weights: &[f32], members: usize) -> Result<()> {
        if weights.len() != members {
            return Err(ClassifierError::Configuration(format!(
                "expected {members} classifier weights, found {}",
                weights.len()
            )));
        }
        if let Some(weight) = weights.iter().find(|weight| !weight.is_finite()) {
            return Err(ClassifierError::Configuration(format!(
                "classifier weights must be finite, found {weight}"
            )));
        }
        Ok(())
    }

    fn check_conformance(&self, index: usize, member: &dyn Classifier) -> Result<()> {
        if member.num_classes() == 0 {
            return Err(ClassifierError::NonConforming(format!(
                "member {index} reports zero classes"
            )));
        }
        let shape = member.input_shape();
        if shape.is_empty() || shape.contains(&0) {
            return Err(ClassifierError::NonConforming(format!(
                "member {index} reports unusable input shape {shape:?}"
            )));
        }
        if !member.clip_values().is_valid() {
            return Err(ClassifierError::NonConforming(format!(
                "member {index} reports invalid clip values {}",
                member.clip_values()
            )));
        }
        Ok(())
    }
}
