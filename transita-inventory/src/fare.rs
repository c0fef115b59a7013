/// Fare arithmetic for a reservation. Minor currency units throughout;
/// i64 to keep multiplication away from overflow for any realistic fleet.
pub fn total_fare(seat_price: i64, seat_count: usize, service_fee: i64) -> i64 {
    seat_price * seat_count as i64 + service_fee
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fare_scales_with_seats() {
        assert_eq!(total_fare(120_000, 2, 0), 240_000);
        assert_eq!(total_fare(120_000, 2, 5_000), 245_000);
    }

    #[test]
    fn single_seat_no_fee() {
        assert_eq!(total_fare(85_000, 1, 0), 85_000);
    }
}
