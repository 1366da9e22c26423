//! Typed access to a device's named parameters.
//!
//! Every call round-trips to the device; nothing is cached. The `verbose`
//! flag only changes the level of the report line.

use tracing::debug;

use crate::acquisition::common::error::{CameraError, Result};
use crate::acquisition::device::{
    AccessMode, CameraDevice, NodeInfo, ParameterKind, ParameterValue, Visibility,
};
use crate::report;

/// A node together with its current value, if it has a readable one.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescription {
    pub name: String,
    pub value: Option<ParameterValue>,
    pub access: AccessMode,
    pub visibility: Visibility,
}

fn kind_label(kind: Option<ParameterKind>) -> &'static str {
    kind.map(|k| k.name()).unwrap_or("valueless")
}

fn checked_node(device: &dyn CameraDevice, name: &str, kind: ParameterKind) -> Result<NodeInfo> {
    let node = device.node(name)?;
    if node.kind != Some(kind) {
        return Err(CameraError::KindMismatch {
            name: name.to_string(),
            requested: kind.name(),
            actual: kind_label(node.kind),
        });
    }
    Ok(node)
}

pub fn get_parameter(
    device: &dyn CameraDevice,
    name: &str,
    kind: ParameterKind,
    verbose: bool,
) -> Result<ParameterValue> {
    checked_node(device, name, kind)?;
    let value = device.read_node(name)?;
    report!(verbose, "Read Parameter \"{}\": {}", name, value);
    Ok(value)
}

pub fn get_float(device: &dyn CameraDevice, name: &str, verbose: bool) -> Result<f64> {
    match get_parameter(device, name, ParameterKind::Float, verbose)? {
        ParameterValue::Float(v) => Ok(v),
        other => Err(unexpected(name, &other)),
    }
}

pub fn get_int(device: &dyn CameraDevice, name: &str, verbose: bool) -> Result<i64> {
    match get_parameter(device, name, ParameterKind::Integer, verbose)? {
        ParameterValue::Integer(v) => Ok(v),
        other => Err(unexpected(name, &other)),
    }
}

pub fn get_bool(device: &dyn CameraDevice, name: &str, verbose: bool) -> Result<bool> {
    match get_parameter(device, name, ParameterKind::Boolean, verbose)? {
        ParameterValue::Boolean(v) => Ok(v),
        other => Err(unexpected(name, &other)),
    }
}

pub fn get_string(device: &dyn CameraDevice, name: &str, verbose: bool) -> Result<String> {
    match get_parameter(device, name, ParameterKind::String, verbose)? {
        ParameterValue::String(v) => Ok(v),
        other => Err(unexpected(name, &other)),
    }
}

fn unexpected(name: &str, value: &ParameterValue) -> CameraError {
    CameraError::Camera(anyhow::anyhow!(
        "device returned a {} value for \"{name}\"",
        value.kind()
    ))
}

/// Writes `value` to the node `name`.
///
/// Fails with [`CameraError::NotWritable`] when the node is not writable or
/// its kind differs from the value's kind.
pub fn set_parameter(
    device: &mut dyn CameraDevice,
    name: &str,
    value: ParameterValue,
    verbose: bool,
) -> Result<()> {
    let node = device.node(name)?;
    if !node.access.is_writable() || node.kind != Some(value.kind()) {
        debug!(
            "Refusing write to \"{}\": access={:?}, kind={}",
            name,
            node.access,
            kind_label(node.kind)
        );
        return Err(CameraError::NotWritable(name.to_string()));
    }

    let previous = if node.access.is_readable() {
        device.read_node(name).ok()
    } else {
        None
    };

    device.write_node(name, &value)?;

    match previous {
        Some(previous) => report!(verbose, "Set Parameter \"{}\" to {} (was {})", name, value, previous),
        None => report!(verbose, "Set Parameter \"{}\" to {}", name, value),
    }
    Ok(())
}

/// Parses `text` according to the node's own kind and writes it.
pub fn set_parameter_from_str(
    device: &mut dyn CameraDevice,
    name: &str,
    text: &str,
    verbose: bool,
) -> Result<()> {
    let node = device.node(name)?;
    let kind = node
        .kind
        .ok_or_else(|| CameraError::NotWritable(name.to_string()))?;
    let value = ParameterValue::parse(kind, text)?;
    set_parameter(device, name, value, verbose)
}

/// Describes a node in a single lookup: its kind decides how the value is read.
pub fn describe_node(device: &dyn CameraDevice, name: &str) -> Result<NodeDescription> {
    let node = device.node(name)?;
    let value = match node.kind {
        Some(_) if node.access.is_readable() => device.read_node(name).ok(),
        _ => None,
    };
    Ok(NodeDescription {
        name: node.name,
        value,
        access: node.access,
        visibility: node.visibility,
    })
}

/// Lists every node in the device's node map with its value and visibility.
pub fn dump_parameters(device: &dyn CameraDevice) -> Result<Vec<NodeDescription>> {
    let names = device.node_names()?;
    let mut nodes = Vec::with_capacity(names.len());
    for name in names {
        match describe_node(device, &name) {
            Ok(description) => nodes.push(description),
            Err(e) => debug!("Skipping node \"{}\": {}", name, e),
        }
    }
    Ok(nodes)
}
