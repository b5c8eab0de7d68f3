//! Calibration and export against the DNA bound to a [`RigInstance`].
//!
//! The instance's runtimes are destroyed first so no reader of a DNA file is
//! alive while its writer runs. File-backed DNA is backed up before any
//! write. Valid results are stored back into the instance's providers; the
//! next evaluation re-reads them.

use rig_dna::{DnaReader, DnaWriter, MemoryReader};
use rig_instance::{BackupType, Component, DnaProvider, RigInstance};
use rig_logic::ValidationReport;

use crate::calibrator::{BodyAlignment, DnaCalibrator};
use crate::error::CalibrationError;
use crate::exporter::DnaExporter;
use crate::options::CalibrationOptions;
use crate::scene::CalibrationScene;
use crate::transforms::EdgeLoopMapping;

fn parts(component: Component) -> &'static [Component] {
    match component {
        Component::Head => &[Component::Head],
        Component::Body => &[Component::Body],
        Component::All => &[Component::Head, Component::Body],
    }
}

fn provider(
    instance: &RigInstance,
    component: Component,
) -> Result<&DnaProvider, CalibrationError> {
    let provider = match component {
        Component::Body => instance.body_dna(),
        _ => instance.head_dna(),
    };
    provider.ok_or_else(|| CalibrationError::MissingDna {
        instance: instance.name().to_string(),
        component,
    })
}

/// Run `step` for each part of `component`, storing what it wrote. Stops at
/// the first invalid report.
fn run_parts<F>(
    instance: &mut RigInstance,
    component: Component,
    backup_type: BackupType,
    mut step: F,
) -> Result<ValidationReport, CalibrationError>
where
    F: FnMut(
        Component,
        &MemoryReader,
        &mut dyn DnaWriter,
    ) -> Result<ValidationReport, CalibrationError>,
{
    instance.destroy();
    instance.backup(backup_type);
    let mut last = None;
    for &part in parts(component) {
        let source = provider(instance, part)?;
        let reader = source.open_reader()?;
        let mut writer = source.writer();
        let report = step(part, &reader, writer.as_mut())?;
        if !report.valid {
            return Ok(report);
        }
        let target = match part {
            Component::Body => instance.body_dna_mut(),
            _ => instance.head_dna_mut(),
        };
        if let Some(target) = target {
            target.store(writer.as_ref());
        }
        last = Some(report);
    }
    Ok(last.unwrap_or_else(|| ValidationReport::success("Success", "Nothing to do.")))
}

/// Calibrate the instance's DNA from `scene`. With
/// `options.align_head_and_body`, the head follows the bound body DNA along
/// `edge_loops`.
pub fn run_calibration(
    instance: &mut RigInstance,
    component: Component,
    scene: &CalibrationScene<'_>,
    options: &CalibrationOptions,
    edge_loops: Option<&EdgeLoopMapping>,
) -> Result<ValidationReport, CalibrationError> {
    let body_reader = match (options.align_head_and_body, instance.body_dna()) {
        (true, Some(body)) => Some(body.open_reader()?),
        (true, None) => {
            log::warn!("'{}' has no body DNA to align the head with", instance.name());
            None
        }
        (false, _) => None,
    };
    let name = instance.name().to_string();

    run_parts(instance, component, BackupType::Calibration, |part, reader, writer| {
        let body = body_reader.as_ref().map(|body| BodyAlignment {
            reader: body as &dyn DnaReader,
            edge_loops: edge_loops.cloned().unwrap_or_default(),
        });
        DnaCalibrator::new(name.as_str(), part, reader)
            .with_options(options.clone())
            .with_body(body)
            .run(scene, writer)
    })
}

/// Rebuild the instance's DNA geometry and joints from `scene`.
pub fn run_export(
    instance: &mut RigInstance,
    component: Component,
    scene: &CalibrationScene<'_>,
    options: &CalibrationOptions,
) -> Result<ValidationReport, CalibrationError> {
    let name = instance.name().to_string();
    run_parts(instance, component, BackupType::Export, |part, reader, writer| {
        DnaExporter::new(name.as_str(), part, reader)
            .with_options(options.clone())
            .run(scene, writer)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_dna::DnaAsset;
    use rig_logic::MemoryScene;

    #[test]
    fn missing_provider_is_an_error() {
        let asset: DnaAsset = rig_test_fixtures::dna::load("head_minimal").unwrap();
        let mut instance = RigInstance::new("ada").with_head_dna(DnaProvider::Memory(asset));
        let meshes = MemoryScene::new();
        let scene = CalibrationScene::new(&meshes);
        let err = run_export(
            &mut instance,
            Component::Body,
            &scene,
            &CalibrationOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.category(), "instance");
        assert_eq!(err.to_string(), "No Body DNA is bound to rig instance 'ada'");
    }
}
