//! Plain-text world map of the registry for a terminal.

use crate::registry::Station;

/// Grid cell for a position on a `width` x `height` equirectangular map.
pub fn project(lat: f64, lon: f64, width: usize, height: usize) -> (usize, usize) {
    let x = ((lon + 180.0) * (width as f64 / 360.0)).floor().max(0.0) as usize;
    let y = ((90.0 - lat) * (height as f64 / 180.0)).floor().max(0.0) as usize;
    (x, y)
}

/// Render each station as `X` followed by its label. Labels are clipped at
/// the right edge and never overwrite another marker.
pub fn render<'a, I>(stations: I, width: usize, height: usize) -> String
where
    I: IntoIterator<Item = &'a Station>,
{
    let mut grid = vec![vec![' '; width]; height];
    let mut markers = Vec::new();

    for s in stations {
        let (x, y) = project(s.coords.lat, s.coords.lon, width, height);
        if x >= width || y >= height {
            continue;
        }
        grid[y][x] = 'X';
        markers.push((x, y, s.log_key().to_string()));
    }

    for (x, y, label) in markers {
        let row = &mut grid[y];
        for (i, c) in format!(" {}", label).chars().enumerate() {
            let col = x + 1 + i;
            if col >= width || row[col] == 'X' {
                break;
            }
            row[col] = c;
        }
    }

    grid.into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
