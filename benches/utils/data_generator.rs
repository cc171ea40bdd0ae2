use jetdb::{RowId, Value};

#[derive(Debug, Clone, Copy)]
pub enum KeyType {
    Small,
    Medium,
    Large,
}

/// Deterministic rows for an index on (text, long).
pub struct DataGenerator {
    seed: u64,
}

impl DataGenerator {
    pub fn new() -> Self {
        Self { seed: 42 }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    // splitmix64, so keys arrive in scrambled order
    fn scramble(&self, id: u64) -> u64 {
        let mut z = id.wrapping_add(self.seed).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    pub fn generate_row(&self, id: u64, key_type: KeyType) -> Vec<Value> {
        let mixed = self.scramble(id);
        let name = match key_type {
            KeyType::Small => format!("{:x}", mixed & 0xFFFF),
            KeyType::Medium => format!("user_name_{:016x}", mixed),
            KeyType::Large => format!("{:016x} {}", mixed, "padding ".repeat(24)),
        };
        vec![Value::text(name), Value::Long((mixed >> 32) as i32)]
    }

    pub fn generate_rows(&self, count: usize, key_type: KeyType) -> Vec<(Vec<Value>, RowId)> {
        (0..count)
            .map(|i| {
                let row_id = RowId::new(16 + (i / 200) as u32, (i % 200) as u8);
                (self.generate_row(i as u64, key_type), row_id)
            })
            .collect()
    }
}
