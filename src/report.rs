use facethumb_vision::Detection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceReport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub area: i64,
    pub confidence: f32,
    pub quality: f32,
    pub score: f32,
    pub landmarks: Vec<[f32; 2]>,
}

impl From<&Detection> for FaceReport {
    fn from(d: &Detection) -> Self {
        Self {
            x: d.bbox.x,
            y: d.bbox.y,
            width: d.bbox.width,
            height: d.bbox.height,
            area: d.area,
            confidence: d.confidence,
            quality: d.quality,
            score: d.score(),
            landmarks: d.landmarks.iter().map(|p| [p.x, p.y]).collect(),
        }
    }
}

pub fn to_json(detections: &[Detection]) -> serde_json::Result<String> {
    let reports: Vec<FaceReport> = detections.iter().map(FaceReport::from).collect();
    serde_json::to_string_pretty(&reports)
}
