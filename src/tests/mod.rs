//! Cross-module scenarios: configuration through resolution, evaluation, and
//! the sign-in round trip.
