pub mod topup_writer;
