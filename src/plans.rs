use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{clamp01, AnchorPoint};

/// Reference points per floor plan, kept in memory.
#[derive(Debug, Clone, Default)]
pub struct PlanPointStore {
    points: HashMap<String, Vec<AnchorPoint>>,
}

impl PlanPointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points of `plan_id` in insertion order.
    pub fn points(&self, plan_id: &str) -> &[AnchorPoint] {
        self.points.get(plan_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn point(&self, plan_id: &str, point_id: Uuid) -> Option<&AnchorPoint> {
        self.points(plan_id).iter().find(|p| p.id == point_id)
    }

    /// Adds a point named `A<n>`, where `n` is the plan's point count after
    /// the insert. Names are labels only and may repeat after deletes.
    pub fn add(&mut self, plan_id: &str, x_norm: f64, y_norm: f64) -> AnchorPoint {
        let points = self.points.entry(plan_id.to_string()).or_default();
        let point = AnchorPoint::new(format!("A{}", points.len() + 1), x_norm, y_norm);
        points.push(point.clone());
        point
    }

    /// Moves a point. Returns `false` when the point is unknown.
    pub fn update(&mut self, plan_id: &str, point_id: Uuid, x_norm: f64, y_norm: f64) -> bool {
        match self.point_mut(plan_id, point_id) {
            Some(point) => {
                point.x_norm = clamp01(x_norm);
                point.y_norm = clamp01(y_norm);
                true
            }
            None => false,
        }
    }

    /// Renames a point. An empty name keeps the old one.
    pub fn rename(&mut self, plan_id: &str, point_id: Uuid, name: &str) -> bool {
        match self.point_mut(plan_id, point_id) {
            Some(point) => {
                if !name.is_empty() {
                    point.name = name.to_string();
                }
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, plan_id: &str, point_id: Uuid) -> bool {
        let Some(points) = self.points.get_mut(plan_id) else {
            return false;
        };
        let before = points.len();
        points.retain(|p| p.id != point_id);
        points.len() != before
    }

    pub fn clear(&mut self, plan_id: &str) {
        self.points.insert(plan_id.to_string(), Vec::new());
    }

    fn point_mut(&mut self, plan_id: &str, point_id: Uuid) -> Option<&mut AnchorPoint> {
        self.points
            .get_mut(plan_id)?
            .iter_mut()
            .find(|p| p.id == point_id)
    }
}
