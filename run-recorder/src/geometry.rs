use geo::{Coord, Distance, Haversine, Point, Rect};

/// Meters per degree of latitude, close enough everywhere for building search boxes
const METERS_PER_DEGREE: f64 = 111_320.0;

pub fn haversine(a: Coord, b: Coord) -> f64 {
    Haversine.distance(Point::from(a), Point::from(b))
}

/// Linear interpolation in lon/lat space. Only meaningful over short distances.
pub fn lerp(a: Coord, b: Coord, fraction: f64) -> Coord {
    Coord {
        x: a.x + (b.x - a.x) * fraction,
        y: a.y + (b.y - a.y) * fraction,
    }
}

/// An axis-aligned box reaching roughly `meters` in every direction from `pt`, using an
/// equirectangular approximation.
pub fn buffer_around(pt: Coord, meters: f64) -> Rect {
    let dy = meters / METERS_PER_DEGREE;
    // Near the poles, cos goes to 0. Nobody's running there, but don't blow up.
    let dx = meters / (METERS_PER_DEGREE * pt.y.to_radians().cos().max(0.01));
    Rect::new(
        Coord {
            x: pt.x - dx,
            y: pt.y - dy,
        },
        Coord {
            x: pt.x + dx,
            y: pt.y + dy,
        },
    )
}
