//! Light prim schemas (the `Lux` family).

/// Fields shared by every light type.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCommon {
    pub intensity: Option<f32>,
    pub exposure: Option<f32>,
    /// Linear rgb.
    pub color: Vec<f32>,
}

impl Default for LightCommon {
    fn default() -> Self {
        LightCommon {
            intensity: None,
            exposure: None,
            color: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SphereLight {
    pub light: LightCommon,
    pub radius: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomeLight {
    pub light: LightCommon,
    pub texture_file: Option<String>,
    pub texture_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskLight {
    pub light: LightCommon,
    pub radius: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistantLight {
    pub light: LightCommon,
    /// Angular size of the light source in degrees.
    pub angle: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CylinderLight {
    pub light: LightCommon,
    pub length: Option<f32>,
    pub radius: Option<f32>,
}
