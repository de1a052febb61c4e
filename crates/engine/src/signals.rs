//! MACD crossover signals and the lagged position series

use crate::types::{IndicatorSeries, Position};

/// Same-bar signal: long above the signal line, short below, flat on a tie
pub fn raw_signal(macd: f64, signal: f64) -> Position {
    if macd > signal {
        Position::Long
    } else if macd < signal {
        Position::Short
    } else {
        Position::Flat
    }
}

/// Position held during each bar.
///
/// `position[i]` is the raw signal of bar `i - 1`; bar 0 is flat. A bar's
/// own close never influences the exposure held over that bar.
pub fn build_positions(indicators: &IndicatorSeries) -> Vec<Position> {
    let n = indicators.len();
    let mut positions = Vec::with_capacity(n);
    for i in 0..n {
        let position = match i.checked_sub(1) {
            Some(prev) => raw_signal(indicators.macd[prev], indicators.signal[prev]),
            None => Position::Flat,
        };
        positions.push(position);
    }
    positions
}

/// Number of bars where the position differs from the previous bar's
pub fn count_changes(positions: &[Position]) -> usize {
    positions.windows(2).filter(|w| w[0] != w[1]).count()
}
