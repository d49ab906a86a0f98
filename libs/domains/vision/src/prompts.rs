//! Prompt assets sent to the provider.

use crate::models::RankingJob;

/// Recognition prompt; the image follows as the only attachment.
pub const RECOGNITION_PROMPT: &str = r#"You are a product recognition assistant.
Identify every distinct purchasable product visible in the image.

For each product output exactly one JSON object on its own line, with these fields:
- "name": short product name (max 100 chars)
- "category": one of kitchen_dining, electronics, clothing, footwear, bags_accessories,
  jewelry_watches, beauty_personal_care, home_decor, furniture, sports_outdoors, toys_games,
  books_media, office_supplies, tools_hardware, automotive, pet_supplies, food_beverage, other
- "iconCategory": one of mug, bottle, phone, laptop, headphones, camera, watch, glasses,
  shirt, dress, pants, jacket, shoe, bag, hat, ring, lamp, chair, sofa, plant, book, toy,
  ball, bike, car, tool, pen, cosmetics, food, pet, other
- "brand": brand name if clearly identifiable, otherwise null
- "primaryColor" and "secondaryColor": simple color names or null
- "features": up to 5 short descriptive tags
- "targetDemographic": one of men, women, unisex, kids
- "searchQuery": a concise shopping search phrase for this product
- "confidence": integer from 1 to 10 describing how sure you are

Output only the JSON objects, most prominent product first. Do not wrap them in an array,
do not add commentary."#;

/// Build the ranking prompt. Candidate images follow the original image in the
/// attachment list, in the order their ids are listed here.
pub fn ranking_prompt(job: &RankingJob, max_results: usize) -> String {
    let ids = job
        .candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. id={}", i + 2, c.id))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a visual similarity judge.
Image 1 is the original product: "{name}" (category: {category}).
Images 2 onwards are candidate products with these ids:
{ids}

Compare each candidate with the original product for visual similarity.
Return at most {max_results} candidates, best match first.
Output one JSON object per line and nothing else, in the form:
{{"id":"<candidate id>","similarityScore":<integer 0-100>,"rank":<integer 1-{max_results}>}}"#,
        name = job.product_name,
        category = job.category_tag,
    )
}
