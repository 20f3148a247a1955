#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ChannelArena, ChannelId, ChannelKind};
use crate::controller::{Bundle, Gains, Pairing, Phase, ReflexController};
use crate::history::{Extrapolation, TimeSample};

/// Binding and recorded-signal extent of one channel at the moment it was
/// taken. `last_sample` is the newest committed sample; trial readings that
/// were never committed do not show up here.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub process: String,
    pub delay: f64,
    pub connected: bool,
    pub extrapolation: Option<Extrapolation>,
    pub sample_count: usize,
    pub first_time: Option<f64>,
    pub last_time: Option<f64>,
    pub last_sample: Option<TimeSample>,
}

impl ChannelSnapshot {
    pub fn of(id: ChannelId, channel: &Channel) -> Self {
        let history = channel.history();
        Self {
            id,
            name: channel.name().to_string(),
            kind: channel.kind(),
            process: channel.process_name().to_string(),
            delay: channel.delay(),
            connected: channel.process_id().is_some(),
            extrapolation: history.map(|h| h.extrapolation()),
            sample_count: history.map_or(0, |h| h.len()),
            first_time: history.and_then(|h| h.first_time()),
            last_time: history.and_then(|h| h.last_time()),
            last_sample: history.and_then(|h| h.samples().last().copied()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BundleSnapshot {
    pub process: usize,
    pub spindles: Vec<String>,
    pub golgis: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControllerSnapshot {
    pub name: String,
    pub phase: Phase,
    pub gains: Option<Gains>,
    pub pairing: Pairing,
    pub normalized_rest_length: f64,
    pub requested_spindles: Vec<String>,
    pub requested_golgis: Vec<String>,
    pub bundles: Vec<BundleSnapshot>,
    pub channels: Vec<ChannelSnapshot>,
}

pub struct ChannelAdapter<'a> {
    arena: &'a ChannelArena,
}

impl<'a> ChannelAdapter<'a> {
    pub fn new(arena: &'a ChannelArena) -> Self {
        Self { arena }
    }

    pub fn snapshot(&self) -> Vec<ChannelSnapshot> {
        self.arena
            .iter()
            .map(|(id, channel)| ChannelSnapshot::of(id, channel))
            .collect()
    }
}

/// Read-only view of a controller together with the channels it reads.
pub struct ControllerAdapter<'a> {
    controller: &'a ReflexController,
    arena: &'a ChannelArena,
}

impl<'a> ControllerAdapter<'a> {
    pub fn new(controller: &'a ReflexController, arena: &'a ChannelArena) -> Self {
        Self { controller, arena }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let config = self.controller.config();

        // Only the channels this controller has bound, in binding order.
        let channels = self
            .controller
            .spindles()
            .bound()
            .iter()
            .chain(self.controller.golgis().bound())
            .filter_map(|&id| Some(ChannelSnapshot::of(id, self.arena.get(id)?)))
            .collect();

        ControllerSnapshot {
            name: self.controller.name().to_string(),
            phase: self.controller.phase(),
            gains: self.controller.gains(),
            pairing: config.pairing,
            normalized_rest_length: config.normalized_rest_length,
            requested_spindles: self.controller.spindles().requested_names().to_vec(),
            requested_golgis: self.controller.golgis().requested_names().to_vec(),
            bundles: self
                .controller
                .bundles()
                .iter()
                .map(|b| bundle_snapshot(self.arena, b))
                .collect(),
            channels,
        }
    }
}

fn bundle_snapshot(arena: &ChannelArena, bundle: &Bundle) -> BundleSnapshot {
    BundleSnapshot {
        process: bundle.process,
        spindles: ids_to_names(arena, &bundle.spindles),
        golgis: ids_to_names(arena, &bundle.golgis),
    }
}

fn ids_to_names(arena: &ChannelArena, ids: &[ChannelId]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| arena.get(*id).map(|c| c.name().to_string()))
        .collect()
}
