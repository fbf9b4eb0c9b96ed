//! Device metadata read at request time.
//!
//! Intrinsics, geolocation, heading and screen orientation come from external
//! providers. The pipeline only reads them; it never polls GPS or compass itself.

use serde::Serialize;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Pinhole intrinsics reported by the AR camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CameraIntrinsics {
    /// Focal lengths in pixels (fx, fy).
    pub focal_length: (f64, f64),
    /// Principal point in pixels (cx, cy).
    pub principal_point: (f64, f64),
    /// Image resolution the intrinsics refer to (width, height).
    pub resolution: (u32, u32),
    /// Axis skew. Not transmitted; the pose service assumes zero skew.
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Wire text understood by the pose service.
    ///
    /// The service locates each value by keyword, so the layout must stay
    /// `focalLength: (fx, fy) principalPoint: (cx, cy) resolution: (w, h)`.
    pub fn to_wire_text(&self) -> String {
        format!(
            "focalLength: ({}, {}) principalPoint: ({}, {}) resolution: ({}, {})",
            format_float(self.focal_length.0),
            format_float(self.focal_length.1),
            format_float(self.principal_point.0),
            format_float(self.principal_point.1),
            self.resolution.0,
            self.resolution.1
        )
    }
}

fn format_float(value: f64) -> String {
    format!("{:.1}", value)
}

/// A geolocation fix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
            horizontal_accuracy: 0.0,
            vertical_accuracy: 0.0,
        }
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &GeoLocation) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_long = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_long / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Compass heading in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Heading {
    pub magnetic: f64,
    pub true_heading: f64,
    pub accuracy: f64,
}

/// State of the location provider.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocationReading {
    /// The provider is not running; location fields are omitted.
    NotRunning,
    Fix {
        location: GeoLocation,
        heading: Option<Heading>,
    },
}

/// Screen orientation as reported by the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ScreenOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl ScreenOrientation {
    /// Rotation around the view axis in degrees, as the pose service expects it.
    pub fn rotation_z(self) -> i32 {
        match self {
            ScreenOrientation::Portrait => 90,
            ScreenOrientation::LandscapeLeft => 180,
            _ => 0,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "portrait" => Some(Self::Portrait),
            "portrait-upside-down" | "portrait_upside_down" => Some(Self::PortraitUpsideDown),
            "landscape-left" | "landscape_left" => Some(Self::LandscapeLeft),
            "landscape-right" | "landscape_right" => Some(Self::LandscapeRight),
            _ => None,
        }
    }
}

/// Source of device metadata, implemented by the host platform.
pub trait MetadataProvider: Send + Sync {
    /// Current camera intrinsics, or `None` when the camera cannot report them.
    fn intrinsics(&self) -> Option<CameraIntrinsics>;

    /// Latest location state.
    fn location(&self) -> LocationReading {
        LocationReading::NotRunning
    }

    fn screen_orientation(&self) -> ScreenOrientation {
        ScreenOrientation::default()
    }
}

/// Fixed metadata, for the CLI and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticMetadata {
    pub intrinsics: Option<CameraIntrinsics>,
    pub location: Option<GeoLocation>,
    pub heading: Option<Heading>,
    pub orientation: ScreenOrientation,
}

impl MetadataProvider for StaticMetadata {
    fn intrinsics(&self) -> Option<CameraIntrinsics> {
        self.intrinsics
    }

    fn location(&self) -> LocationReading {
        match self.location {
            Some(location) => LocationReading::Fix {
                location,
                heading: self.heading,
            },
            None => LocationReading::NotRunning,
        }
    }

    fn screen_orientation(&self) -> ScreenOrientation {
        self.orientation
    }
}

/// Metadata snapshot attached to one pose request.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceMetadata {
    pub intrinsics: CameraIntrinsics,
    pub location: LocationReading,
    pub rotation_z: i32,
}

impl DeviceMetadata {
    /// Snapshot the provider. Fails when intrinsics are unavailable.
    pub fn gather(provider: &dyn MetadataProvider) -> Option<Self> {
        let intrinsics = provider.intrinsics()?;
        Some(Self {
            intrinsics,
            location: provider.location(),
            rotation_z: provider.screen_orientation().rotation_z(),
        })
    }

    pub fn geolocation(&self) -> Option<&GeoLocation> {
        match &self.location {
            LocationReading::Fix { location, .. } => Some(location),
            LocationReading::NotRunning => None,
        }
    }

    /// The `message` form field: `<intrinsics>,longitude<V>,latitude<V>,rotationZ<V>,`.
    pub fn to_message(&self) -> String {
        let mut parts = vec![self.intrinsics.to_wire_text()];
        if let Some(location) = self.geolocation() {
            parts.push(format!("longitude{}", location.longitude));
            parts.push(format!("latitude{}", location.latitude));
        }
        parts.push(format!("rotationZ{}", self.rotation_z));
        let mut message = parts.join(",");
        message.push(',');
        message
    }

    /// Query pairs describing the current fix. Empty when location is not running.
    pub fn location_query(&self) -> Vec<(String, String)> {
        let LocationReading::Fix { location, heading } = &self.location else {
            return Vec::new();
        };
        let mut query = vec![
            ("lat".to_string(), location.latitude.to_string()),
            ("long".to_string(), location.longitude.to_string()),
            ("horAcc".to_string(), location.horizontal_accuracy.to_string()),
            ("altitude".to_string(), location.altitude.to_string()),
            ("verAcc".to_string(), location.vertical_accuracy.to_string()),
        ];
        if let Some(heading) = heading {
            query.push(("magneticHeading".to_string(), heading.magnetic.to_string()));
            query.push(("trueHeading".to_string(), heading.true_heading.to_string()));
            query.push(("headAcc".to_string(), heading.accuracy.to_string()));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            focal_length: (1450.5, 1451.0),
            principal_point: (960.0, 540.5),
            resolution: (1920, 1080),
            skew: 0.0,
        }
    }

    #[test]
    fn intrinsics_text_matches_service_layout() {
        assert_eq!(
            intrinsics().to_wire_text(),
            "focalLength: (1450.5, 1451.0) principalPoint: (960.0, 540.5) resolution: (1920, 1080)"
        );
    }

    #[test]
    fn message_includes_location_when_running() {
        let meta = DeviceMetadata {
            intrinsics: intrinsics(),
            location: LocationReading::Fix {
                location: GeoLocation::new(48.1351, 11.582),
                heading: None,
            },
            rotation_z: 90,
        };
        let message = meta.to_message();
        assert!(message.starts_with("focalLength: "));
        assert!(message.ends_with(",longitude11.582,latitude48.1351,rotationZ90,"));
    }

    #[test]
    fn message_omits_location_when_not_running() {
        let meta = DeviceMetadata {
            intrinsics: intrinsics(),
            location: LocationReading::NotRunning,
            rotation_z: 0,
        };
        let message = meta.to_message();
        assert!(!message.contains("longitude"));
        assert!(message.ends_with("resolution: (1920, 1080),rotationZ0,"));
        assert!(meta.location_query().is_empty());
    }

    #[test]
    fn orientation_maps_to_rotation_z() {
        assert_eq!(ScreenOrientation::Portrait.rotation_z(), 90);
        assert_eq!(ScreenOrientation::LandscapeLeft.rotation_z(), 180);
        assert_eq!(ScreenOrientation::LandscapeRight.rotation_z(), 0);
        assert_eq!(ScreenOrientation::PortraitUpsideDown.rotation_z(), 0);
        assert_eq!(
            ScreenOrientation::parse("Landscape-Left"),
            Some(ScreenOrientation::LandscapeLeft)
        );
    }

    #[test]
    fn gather_requires_intrinsics() {
        let provider = StaticMetadata::default();
        assert!(DeviceMetadata::gather(&provider).is_none());
    }

    #[test]
    fn location_query_carries_heading() {
        let provider = StaticMetadata {
            intrinsics: Some(intrinsics()),
            location: Some(GeoLocation::new(1.0, 2.0)),
            heading: Some(Heading {
                magnetic: 10.0,
                true_heading: 12.0,
                accuracy: 3.0,
            }),
            orientation: ScreenOrientation::Portrait,
        };
        let meta = DeviceMetadata::gather(&provider).unwrap();
        let keys: Vec<_> = meta.location_query().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "lat",
                "long",
                "horAcc",
                "altitude",
                "verAcc",
                "magneticHeading",
                "trueHeading",
                "headAcc"
            ]
        );
    }

    #[test]
    fn haversine_distance_is_plausible() {
        // About 560 m apart.
        let a = GeoLocation::new(48.1390, 11.5660);
        let b = GeoLocation::new(48.1340, 11.5670);
        let d = a.distance_to(&b);
        assert!((500.0..700.0).contains(&d), "distance {}", d);
        assert!(a.distance_to(&a).abs() < 1e-6);
    }
}
